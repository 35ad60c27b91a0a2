//! # Taskline Core
//!
//! 任务生命周期调度系统的核心类型库：错误定义、领域模型、
//! 仓储与事件总线抽象接口、主题模式匹配以及应用配置。

pub mod config;
pub mod errors;
pub mod models;
pub mod topic;
pub mod traits;

pub use config::AppConfig;
pub use errors::{ErrorKind, Result, TasklineError};
pub use models::{
    topics, DomainEvent, JobBinding, JobKind, JobPayload, Patch, Schedule, ScheduledJob, Task,
    TaskFilter, TaskStatus,
};
pub use traits::{
    Delivery, EventBus, JobBindingRepository, JobRepository, ScheduleRepository, TaskRepository,
};
