use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use taskline_core::config::WorkerConfig;
use taskline_core::errors::Result;
use taskline_core::models::{topics, DomainEvent};
use taskline_core::traits::EventBus;

use crate::handlers::TaskEventHandlers;

/// 生命周期事件消费端
///
/// 轮询订阅了`jobs.*`模式的持久化队列，把引擎确认事件分发给状态
/// 处理器。空轮询短暂休眠，消费出错退避一秒后继续。
pub struct LifecycleWorker {
    bus: Arc<dyn EventBus>,
    handlers: Arc<TaskEventHandlers>,
    queue: String,
    poll_interval: Duration,
    batch_size: usize,
    running: Arc<tokio::sync::RwLock<bool>>,
}

impl LifecycleWorker {
    pub fn new(
        bus: Arc<dyn EventBus>,
        handlers: Arc<TaskEventHandlers>,
        queue: String,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            bus,
            handlers,
            queue,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            batch_size: config.batch_size,
            running: Arc::new(tokio::sync::RwLock::new(false)),
        }
    }

    /// 声明队列绑定并进入消费循环，直到stop()被调用
    pub async fn start(&self) -> Result<()> {
        self.bus
            .subscribe(&self.queue, topics::JOB_ACK_PATTERN)
            .await?;

        {
            let mut running = self.running.write().await;
            *running = true;
        }
        info!("生命周期消费端启动，监听队列: {}", self.queue);

        loop {
            if !self.is_running().await {
                info!("收到停止信号，退出队列 {} 的消费", self.queue);
                break;
            }

            match self.poll_once().await {
                Ok(0) => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("从队列 {} 消费事件时出错: {e}", self.queue);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        Ok(())
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        info!("生命周期消费端停止信号已发送");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// 拉取一批事件并逐条分发，返回成功处理的数量
    ///
    /// 处理成功才确认投递；失败的事件重新入队，等待下次轮询重试，
    /// 单条失败不中断批次。
    pub async fn poll_once(&self) -> Result<usize> {
        let deliveries = self.bus.consume(&self.queue, self.batch_size).await?;
        let mut handled = 0usize;

        for delivery in deliveries {
            match self.dispatch(&delivery.event).await {
                Ok(()) => {
                    self.bus.ack(&self.queue, delivery.ack_id).await?;
                    handled += 1;
                }
                Err(e) => {
                    error!(
                        "处理事件 {} ({}) 失败，重新入队: {e}",
                        delivery.event.name, delivery.event.id
                    );
                    self.bus.nack(&self.queue, delivery.ack_id).await?;
                }
            }
        }

        Ok(handled)
    }

    async fn dispatch(&self, event: &DomainEvent) -> Result<()> {
        let Some(task_id) = event.task_id() else {
            warn!("事件 {} 缺少task_id，丢弃", event.name);
            return Ok(());
        };

        match event.name.as_str() {
            topics::JOB_DUE => self.handlers.on_due(task_id).await,
            topics::JOB_REPEATED => self.handlers.on_repeated(task_id).await,
            other => {
                debug!("忽略不支持的事件类型: {other}");
                Ok(())
            }
        }
    }
}
