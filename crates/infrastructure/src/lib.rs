//! # Taskline Infrastructure
//!
//! 基础设施层：SQLite持久化仓储与事件总线（内存/RabbitMQ）实现。

pub mod database;
pub mod event_bus;

pub use database::sqlite::{
    connect, connect_in_memory, SqliteJobBindingRepository, SqliteJobRepository,
    SqliteScheduleRepository, SqliteTaskRepository,
};
pub use event_bus::{InMemoryEventBus, RabbitMqEventBus};
