//! 核心抽象接口定义

pub mod event_bus;
pub mod repository;

pub use event_bus::{Delivery, EventBus};
pub use repository::{JobBindingRepository, JobRepository, ScheduleRepository, TaskRepository};
