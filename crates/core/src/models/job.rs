use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 作业类型
///
/// - `Single`: 一次性延迟作业，触发后即销毁
/// - `Cron`: 周期性作业，按CRON表达式无限触发直至显式撤销
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobKind {
    #[serde(rename = "SINGLE")]
    Single,
    #[serde(rename = "CRON")]
    Cron,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Single => "SINGLE",
            JobKind::Cron => "CRON",
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for JobKind {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobKind {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        match s {
            "SINGLE" => Ok(JobKind::Single),
            "CRON" => Ok(JobKind::Cron),
            _ => Err(format!("Invalid job kind: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobKind {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 作业负载
///
/// 触发事件只携带路由所需的最小字段，消费方自行回查任务最新状态。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobPayload {
    pub task_id: String,
    pub task_name: String,
    pub user_id: String,
}

/// 持久化作业定义
///
/// 一次性作业使用`next_fire_time`，周期性作业使用`cron_pattern`与
/// `last_fired_at`。`ack_event`是触发时发布到事件总线的主题名。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: String,
    pub name: String,
    pub kind: JobKind,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub cron_pattern: Option<String>,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub payload: JobPayload,
    pub ack_event: String,
    pub created_at: DateTime<Utc>,
}

impl ScheduledJob {
    /// 创建一次性作业，ID由引擎分配
    pub fn single(
        name: String,
        execution_date: DateTime<Utc>,
        payload: JobPayload,
        ack_event: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            kind: JobKind::Single,
            next_fire_time: Some(execution_date),
            cron_pattern: None,
            last_fired_at: None,
            payload,
            ack_event,
            created_at: Utc::now(),
        }
    }

    /// 创建周期性作业，ID由调用方指定（upsert键）
    pub fn cron(key: String, pattern: String, name: String, payload: JobPayload, ack_event: String) -> Self {
        Self {
            id: key,
            name,
            kind: JobKind::Cron,
            next_fire_time: None,
            cron_pattern: Some(pattern),
            last_fired_at: None,
            payload,
            ack_event,
            created_at: Utc::now(),
        }
    }
}

/// 作业绑定记录
///
/// 任务与其名下作业的持久关联，约定同一任务至多绑定一个SINGLE和一个CRON。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobBinding {
    pub job_id: String,
    pub kind: JobKind,
    pub task_id: String,
    pub created_at: DateTime<Utc>,
}

impl JobBinding {
    pub fn new(job_id: String, kind: JobKind, task_id: String) -> Self {
        Self {
            job_id,
            kind,
            task_id,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_job_shape() {
        let when = Utc::now();
        let payload = JobPayload {
            task_id: "t-1".to_string(),
            task_name: "提交报告".to_string(),
            user_id: "u-1".to_string(),
        };
        let job = ScheduledJob::single("due:t-1".to_string(), when, payload, "jobs.due".to_string());
        assert_eq!(job.kind, JobKind::Single);
        assert_eq!(job.next_fire_time, Some(when));
        assert!(job.cron_pattern.is_none());
        assert!(!job.id.is_empty());
    }

    #[test]
    fn test_cron_job_uses_key_as_id() {
        let payload = JobPayload {
            task_id: "t-1".to_string(),
            task_name: "晨会".to_string(),
            user_id: "u-1".to_string(),
        };
        let job = ScheduledJob::cron(
            "cron:t-1".to_string(),
            "0 0 9 * * *".to_string(),
            "repeat:t-1".to_string(),
            payload,
            "jobs.repeated".to_string(),
        );
        assert_eq!(job.id, "cron:t-1");
        assert_eq!(job.kind, JobKind::Cron);
        assert!(job.next_fire_time.is_none());
    }

    #[test]
    fn test_kind_wire_format() {
        assert_eq!(serde_json::to_string(&JobKind::Single).unwrap(), "\"SINGLE\"");
        assert_eq!(serde_json::to_string(&JobKind::Cron).unwrap(), "\"CRON\"");
    }
}
