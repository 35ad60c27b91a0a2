//! 领域模型定义
//!
//! 包含任务、日程、作业、绑定记录与领域事件等核心数据结构。

pub mod event;
pub mod job;
pub mod patch;
pub mod schedule;
pub mod task;

pub use event::{topics, DomainEvent};
pub use job::{JobBinding, JobKind, JobPayload, ScheduledJob};
pub use patch::Patch;
pub use schedule::Schedule;
pub use task::{Task, TaskFilter, TaskStatus};
