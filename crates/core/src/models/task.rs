use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 任务定义
///
/// 表示用户日程下的一个待办任务，携带可选的到期时间和重复规则。
///
/// # 字段说明
///
/// - `id`: 任务唯一标识符
/// - `schedule_id`: 所属日程ID
/// - `user_id`: 所属用户ID
/// - `status`: 任务状态（NOT_STARTED/IN_PROGRESS/DONE/FAILED）
/// - `due_to`: 到期时间，设置后必须存在对应的一次性作业
/// - `repeat`: CRON表达式，设置后必须存在对应的周期性作业
/// - `start_time` / `end_time`: 当日起止时刻
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub schedule_id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub due_to: Option<DateTime<Utc>>,
    pub repeat: Option<String>,
    pub priority: i32,
    pub fixed: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 任务状态
///
/// 状态机: NOT_STARTED -> IN_PROGRESS -> DONE；
/// 到期事件触发时非DONE状态转为FAILED；重复事件触发时无条件重置为NOT_STARTED。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskStatus {
    #[serde(rename = "NOT_STARTED")]
    NotStarted,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "DONE")]
    Done,
    #[serde(rename = "FAILED")]
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "NOT_STARTED",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Done => "DONE",
            TaskStatus::Failed => "FAILED",
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for TaskStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        match s {
            "NOT_STARTED" => Ok(TaskStatus::NotStarted),
            "IN_PROGRESS" => Ok(TaskStatus::InProgress),
            "DONE" => Ok(TaskStatus::Done),
            "FAILED" => Ok(TaskStatus::Failed),
            _ => Err(format!("Invalid task status: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 任务过滤器
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub schedule_id: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Task {
    /// 创建新任务，初始状态为NOT_STARTED
    pub fn new(schedule_id: String, user_id: String, name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            schedule_id,
            user_id,
            name,
            description: None,
            status: TaskStatus::NotStarted,
            due_to: None,
            repeat: None,
            priority: 0,
            fixed: false,
            start_time: None,
            end_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 任务是否仍未完成（到期事件会使其转为FAILED）
    pub fn is_open(&self) -> bool {
        matches!(self.status, TaskStatus::NotStarted | TaskStatus::InProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_defaults() {
        let task = Task::new("s-1".to_string(), "u-1".to_string(), "买菜".to_string());
        assert_eq!(task.status, TaskStatus::NotStarted);
        assert_eq!(task.priority, 0);
        assert!(!task.fixed);
        assert!(task.due_to.is_none());
        assert!(task.repeat.is_none());
        assert!(task.is_open());
    }

    #[test]
    fn test_status_serde_wire_format() {
        let json = serde_json::to_string(&TaskStatus::NotStarted).unwrap();
        assert_eq!(json, "\"NOT_STARTED\"");
        let status: TaskStatus = serde_json::from_str("\"IN_PROGRESS\"").unwrap();
        assert_eq!(status, TaskStatus::InProgress);
    }

    #[test]
    fn test_is_open() {
        let mut task = Task::new("s-1".to_string(), "u-1".to_string(), "t".to_string());
        task.status = TaskStatus::Done;
        assert!(!task.is_open());
        task.status = TaskStatus::Failed;
        assert!(!task.is_open());
        task.status = TaskStatus::InProgress;
        assert!(task.is_open());
    }
}
