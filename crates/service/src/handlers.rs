use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use taskline_core::errors::Result;
use taskline_core::models::{DomainEvent, TaskStatus};
use taskline_core::traits::{EventBus, TaskRepository};

/// 作业确认事件处理器
///
/// 消费引擎的触发确认，迁移任务状态后向下游重发领域事件。确认事件
/// 按至少一次投递，状态改写前先检查现状保证重投幂等；下游事件的
/// 发布失败只记日志，不回滚已提交的状态变更。
pub struct TaskEventHandlers {
    tasks: Arc<dyn TaskRepository>,
    bus: Arc<dyn EventBus>,
}

impl TaskEventHandlers {
    pub fn new(tasks: Arc<dyn TaskRepository>, bus: Arc<dyn EventBus>) -> Self {
        Self { tasks, bus }
    }

    /// 到期确认：未完成的任务标记FAILED，随后重发tasks.due
    ///
    /// 任务已删除（作业触发后、事件消费前被删）时丢弃事件，不算错误。
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn on_due(&self, task_id: &str) -> Result<()> {
        let task = match self.tasks.find_one(task_id).await? {
            Some(task) => task,
            None => {
                warn!("到期事件对应的任务已不存在，丢弃: {}", task_id);
                return Ok(());
            }
        };

        if task.is_open() {
            self.tasks.update_status(task_id, TaskStatus::Failed).await?;
            info!("任务到期未完成，标记失败: {}", task_id);
        } else {
            debug!("任务 {} 状态已终结（{}），跳过改写", task_id, task.status.as_str());
        }

        self.publish_logged(DomainEvent::task_due(&task.id, &task.user_id))
            .await;
        Ok(())
    }

    /// 重复确认：无条件重置为NOT_STARTED，随后重发tasks.repeated
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn on_repeated(&self, task_id: &str) -> Result<()> {
        let task = match self.tasks.find_one(task_id).await? {
            Some(task) => task,
            None => {
                warn!("重复事件对应的任务已不存在，丢弃: {}", task_id);
                return Ok(());
            }
        };

        self.tasks
            .update_status(task_id, TaskStatus::NotStarted)
            .await?;
        info!("任务进入新周期，状态重置: {}", task_id);

        self.publish_logged(DomainEvent::task_repeated(&task.id, &task.user_id))
            .await;
        Ok(())
    }

    async fn publish_logged(&self, event: DomainEvent) {
        if let Err(e) = self.bus.publish(&event).await {
            error!("下游事件 {} 发布失败: {e}", event.name);
        }
    }
}
