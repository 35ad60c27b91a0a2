use thiserror::Error;

/// 系统统一错误类型定义
#[derive(Debug, Error)]
pub enum TasklineError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("任务未找到: {id}")]
    TaskNotFound { id: String },

    #[error("日程未找到: {id}")]
    ScheduleNotFound { id: String },

    #[error("作业未找到: {id}")]
    JobNotFound { id: String },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("无效的执行时间: {message}")]
    InvalidSchedule { message: String },

    #[error("外键约束冲突: {0}")]
    Constraint(String),

    #[error("事件总线错误: {0}")]
    EventBus(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, TasklineError>;

/// 传输层错误分类
///
/// 域内错误在服务边界被映射为固定的四类，传输层据此选择状态码。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    Constraint,
    Internal,
}

impl TasklineError {
    /// 返回错误所属的传输层分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            TasklineError::TaskNotFound { .. }
            | TasklineError::ScheduleNotFound { .. }
            | TasklineError::JobNotFound { .. } => ErrorKind::NotFound,
            TasklineError::InvalidCron { .. } | TasklineError::InvalidSchedule { .. } => {
                ErrorKind::InvalidArgument
            }
            TasklineError::Constraint(_) => ErrorKind::Constraint,
            _ => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for TasklineError {
    fn from(err: serde_json::Error) -> Self {
        TasklineError::Serialization(err.to_string())
    }
}
