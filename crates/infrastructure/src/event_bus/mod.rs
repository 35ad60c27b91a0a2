//! 事件总线实现

pub mod memory;
pub mod rabbitmq;

pub use memory::InMemoryEventBus;
pub use rabbitmq::RabbitMqEventBus;
