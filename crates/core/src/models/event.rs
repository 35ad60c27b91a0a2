use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Result;
use crate::models::ScheduledJob;

/// 领域事件主题
///
/// 主题名以点分段，支持通配符订阅（`*`匹配单段，`#`匹配其余所有段）。
pub mod topics {
    /// 引擎确认事件: 一次性作业到期触发
    pub const JOB_DUE: &str = "jobs.due";
    /// 引擎确认事件: 周期性作业触发
    pub const JOB_REPEATED: &str = "jobs.repeated";
    /// 生命周期处理器迁移状态后向下游重发
    pub const TASK_DUE: &str = "tasks.due";
    pub const TASK_REPEATED: &str = "tasks.repeated";
    /// 生命周期消费组订阅的通配模式
    pub const JOB_ACK_PATTERN: &str = "jobs.*";
}

/// 领域事件信封
///
/// 负载只携带标识字段，消费方回查任务最新状态，避免事件中携带过期数据。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainEvent {
    pub id: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            payload,
            occurred_at: Utc::now(),
        }
    }

    /// 作业触发时由引擎发布的确认事件，主题取作业配置的`ack_event`
    pub fn job_fired(job: &ScheduledJob) -> Self {
        Self::new(
            job.ack_event.clone(),
            serde_json::json!({
                "job_id": job.id,
                "task_id": job.payload.task_id,
                "task_name": job.payload.task_name,
                "user_id": job.payload.user_id,
            }),
        )
    }

    /// 任务到期、状态已迁移后发布的下游事件
    pub fn task_due(task_id: &str, user_id: &str) -> Self {
        Self::new(
            topics::TASK_DUE,
            serde_json::json!({ "task": { "id": task_id, "user_id": user_id } }),
        )
    }

    /// 任务重置后发布的下游事件
    pub fn task_repeated(task_id: &str, user_id: &str) -> Self {
        Self::new(
            topics::TASK_REPEATED,
            serde_json::json!({ "task": { "id": task_id, "user_id": user_id } }),
        )
    }

    /// 从负载中提取`task_id`，确认事件消费路径使用
    pub fn task_id(&self) -> Option<&str> {
        self.payload.get("task_id").and_then(|v| v.as_str())
    }

    /// 序列化为字节，供总线实现传输
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// 从字节反序列化
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
