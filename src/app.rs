use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use taskline_core::config::AppConfig;
use taskline_core::models::topics;
use taskline_core::traits::EventBus;
use taskline_engine::{JobDispatcher, JobEngine};
use taskline_infrastructure::{
    connect, connect_in_memory, InMemoryEventBus, RabbitMqEventBus, SqliteJobBindingRepository,
    SqliteJobRepository, SqliteScheduleRepository, SqliteTaskRepository,
};
use taskline_service::{JobService, LifecycleWorker, TaskEventHandlers, TaskService};
use tokio::sync::broadcast;
use tracing::{error, info};

/// 应用运行模式
#[derive(Debug, Clone)]
pub enum AppMode {
    /// 仅运行作业引擎的调度循环
    Engine,
    /// 仅运行生命周期消费端
    Worker,
    /// 运行所有组件
    All,
}

/// 主应用程序
///
/// 按配置装配数据库连接池、事件总线与各层服务，并按运行模式启动
/// 调度循环和消费循环。
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    bus: Arc<dyn EventBus>,
    dispatcher: Arc<JobDispatcher>,
    worker: Arc<LifecycleWorker>,
    task_service: Arc<TaskService>,
}

impl Application {
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        let pool = if config.database.path == ":memory:" {
            connect_in_memory().await.context("创建内存数据库失败")?
        } else {
            connect(&config.database.path, config.database.max_connections)
                .await
                .with_context(|| format!("连接数据库失败: {}", config.database.path))?
        };

        let bus: Arc<dyn EventBus> = match config.event_bus.backend.as_str() {
            "memory" => Arc::new(InMemoryEventBus::new()),
            "rabbitmq" => Arc::new(
                RabbitMqEventBus::new(&config.event_bus)
                    .await
                    .context("连接RabbitMQ失败")?,
            ),
            other => return Err(anyhow::anyhow!("不支持的事件总线后端: {other}")),
        };

        // 任何组件启动前先绑定生命周期队列，引擎先于消费端触发时事件不丢
        bus.subscribe(&config.event_bus.lifecycle_queue, topics::JOB_ACK_PATTERN)
            .await
            .context("绑定生命周期队列失败")?;

        let task_repo = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let schedule_repo = Arc::new(SqliteScheduleRepository::new(pool.clone()));
        let job_repo = Arc::new(SqliteJobRepository::new(pool.clone()));
        let binding_repo = Arc::new(SqliteJobBindingRepository::new(pool));

        let engine = Arc::new(JobEngine::new(job_repo.clone()));
        let dispatcher = Arc::new(JobDispatcher::new(
            job_repo,
            bus.clone(),
            Duration::from_secs(config.engine.scan_interval_seconds),
        ));

        let job_service = Arc::new(JobService::new(engine, binding_repo));
        let task_service = Arc::new(TaskService::new(
            task_repo.clone(),
            schedule_repo,
            job_service,
        ));

        let handlers = Arc::new(TaskEventHandlers::new(task_repo, bus.clone()));
        let worker = Arc::new(LifecycleWorker::new(
            bus.clone(),
            handlers,
            config.event_bus.lifecycle_queue.clone(),
            &config.worker,
        ));

        Ok(Self {
            config,
            mode,
            bus,
            dispatcher,
            worker,
            task_service,
        })
    }

    /// 事件总线句柄，供嵌入方发布事件或检查队列
    pub fn event_bus(&self) -> Arc<dyn EventBus> {
        Arc::clone(&self.bus)
    }

    /// 任务生命周期服务，供嵌入方直接调用
    pub fn task_service(&self) -> Arc<TaskService> {
        Arc::clone(&self.task_service)
    }

    /// 运行应用程序，直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);

        match self.mode {
            AppMode::Engine => self.run_engine(shutdown_rx).await,
            AppMode::Worker => self.run_worker(shutdown_rx).await,
            AppMode::All => self.run_all(shutdown_rx).await,
        }
    }

    async fn run_engine(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动作业引擎调度循环");
        self.dispatcher.run(shutdown_rx).await;
        info!("作业引擎已停止");
        Ok(())
    }

    async fn run_worker(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动生命周期消费端");

        let worker_handle = {
            let worker = Arc::clone(&self.worker);
            tokio::spawn(async move {
                if let Err(e) = worker.start().await {
                    error!("生命周期消费端运行失败: {e}");
                }
            })
        };

        let _ = shutdown_rx.recv().await;
        info!("消费端收到关闭信号");

        self.worker.stop().await;
        let _ = worker_handle.await;

        info!("生命周期消费端已停止");
        Ok(())
    }

    async fn run_all(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动所有组件");

        let mut handles = Vec::new();

        if self.config.engine.enabled {
            let dispatcher = Arc::clone(&self.dispatcher);
            let rx = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move {
                dispatcher.run(rx).await;
            }));
        }

        if self.config.worker.enabled {
            let worker = Arc::clone(&self.worker);
            handles.push(tokio::spawn(async move {
                if let Err(e) = worker.start().await {
                    error!("生命周期消费端运行失败: {e}");
                }
            }));
        }

        if handles.is_empty() {
            return Err(anyhow::anyhow!("引擎和消费端均被禁用，无组件可运行"));
        }

        // 等待关闭信号，再停掉消费循环
        let mut rx = shutdown_rx;
        let _ = rx.recv().await;
        info!("收到关闭信号，停止所有组件");
        self.worker.stop().await;

        for handle in handles {
            let _ = handle.await;
        }

        info!("所有组件已停止");
        Ok(())
    }
}
