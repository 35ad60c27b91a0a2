//! 事件总线抽象接口

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::DomainEvent;

/// 一次待确认的事件投递
///
/// `ack_id`是队列内的投递标签，确认或重新入队时原样传回。
#[derive(Debug, Clone)]
pub struct Delivery {
    pub event: DomainEvent,
    pub ack_id: u64,
}

/// 事件总线接口
///
/// 以主题路由的持久化发布订阅通道，投递语义为至少一次：消费拉取到的
/// 投递在显式`ack`之前不算完成，处理失败用`nack`放回队列等待重试，
/// 重复投递由处理器幂等逻辑消化。
#[async_trait]
pub trait EventBus: Send + Sync {
    /// 发布事件，按事件名作为路由主题
    ///
    /// 业务调用方不应让发布失败回滚已提交的事务，应记录日志后继续；
    /// 引擎一侧则依据返回值决定作业行是否可以删除。
    async fn publish(&self, event: &DomainEvent) -> Result<()>;

    /// 声明持久化队列并绑定订阅模式，重复声明幂等
    async fn subscribe(&self, queue: &str, pattern: &str) -> Result<()>;

    /// 拉取队列中就绪的投递，最多`max`条，无事件时返回空集合
    async fn consume(&self, queue: &str, max: usize) -> Result<Vec<Delivery>>;

    /// 确认投递已处理完成
    async fn ack(&self, queue: &str, ack_id: u64) -> Result<()>;

    /// 放弃本次投递并重新入队，等待下次消费
    async fn nack(&self, queue: &str, ack_id: u64) -> Result<()>;

    /// 队列当前积压数量，不含已拉取未确认的投递
    async fn queue_size(&self, queue: &str) -> Result<u64>;
}
