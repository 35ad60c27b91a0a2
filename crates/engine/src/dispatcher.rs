use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use taskline_core::errors::Result;
use taskline_core::models::{DomainEvent, JobKind};
use taskline_core::traits::{EventBus, JobRepository};

use crate::cron_utils::CronEvaluator;

/// 作业触发调度器
///
/// 周期性扫描作业表：到期的一次性作业发布确认事件后删除行，发布失败
/// 则保留到下一轮重试；周期性作业按CRON求值触发并记录触发时间。
/// 启动后的第一轮扫描天然完成停机期间积压作业的恢复触发。
pub struct JobDispatcher {
    jobs: Arc<dyn JobRepository>,
    bus: Arc<dyn EventBus>,
    scan_interval: Duration,
}

impl JobDispatcher {
    pub fn new(jobs: Arc<dyn JobRepository>, bus: Arc<dyn EventBus>, scan_interval: Duration) -> Self {
        Self {
            jobs,
            bus,
            scan_interval,
        }
    }

    /// 调度循环，收到关闭信号后退出
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("作业调度循环启动，扫描间隔 {:?}", self.scan_interval);
        let mut interval = tokio::time::interval(self.scan_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.scan_and_fire(Utc::now()).await {
                        error!("作业扫描失败: {e}");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("作业调度循环收到关闭信号");
                    break;
                }
            }
        }
    }

    /// 单轮扫描，返回本轮触发的作业数
    #[instrument(skip(self))]
    pub async fn scan_and_fire(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut fired = 0usize;

        for job in self.jobs.due_singles(now).await? {
            let event = DomainEvent::job_fired(&job);
            match self.bus.publish(&event).await {
                Ok(()) => {
                    // 发布成功后才允许删除，保证至少一次
                    self.jobs.remove(&job.id, JobKind::Single).await?;
                    fired += 1;
                    debug!("一次性作业已触发: {} -> {}", job.id, job.ack_event);
                }
                Err(e) => {
                    warn!("作业 {} 触发事件发布失败，下一轮重试: {e}", job.id);
                }
            }
        }

        for job in self.jobs.active_crons().await? {
            let Some(pattern) = job.cron_pattern.as_deref() else {
                warn!("周期作业 {} 缺少CRON表达式，跳过", job.id);
                continue;
            };
            let evaluator = match CronEvaluator::new(pattern) {
                Ok(evaluator) => evaluator,
                Err(e) => {
                    warn!("周期作业 {} 的表达式无效，跳过: {e}", job.id);
                    continue;
                }
            };

            let baseline = job.last_fired_at.or(Some(job.created_at));
            if !evaluator.should_trigger(baseline, now) {
                continue;
            }

            let event = DomainEvent::job_fired(&job);
            match self.bus.publish(&event).await {
                Ok(()) => {
                    self.jobs.mark_fired(&job.id, now).await?;
                    fired += 1;
                    debug!("周期作业已触发: {} -> {}", job.id, job.ack_event);
                }
                Err(e) => {
                    warn!("作业 {} 触发事件发布失败，下一轮重试: {e}", job.id);
                }
            }
        }

        if fired > 0 {
            info!("本轮扫描触发 {} 个作业", fired);
        }
        Ok(fired)
    }
}
