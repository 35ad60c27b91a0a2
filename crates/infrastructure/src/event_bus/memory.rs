use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use taskline_core::errors::Result;
use taskline_core::models::DomainEvent;
use taskline_core::topic;
use taskline_core::traits::{Delivery, EventBus};

/// 单个内存队列：绑定的订阅模式、待消费事件与已拉取未确认的投递
#[derive(Default)]
struct MemoryQueue {
    patterns: Vec<String>,
    events: VecDeque<DomainEvent>,
    unacked: HashMap<u64, DomainEvent>,
}

/// 内存事件总线实现
///
/// 进程内的topic路由队列，matching语义与RabbitMQ后端一致，供memory
/// 运行模式与测试使用。不跨进程、不持久化。
#[derive(Default)]
pub struct InMemoryEventBus {
    queues: Arc<RwLock<HashMap<String, MemoryQueue>>>,
    next_ack_id: AtomicU64,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let mut queues = self.queues.write().await;
        let mut delivered = 0usize;

        for (name, queue) in queues.iter_mut() {
            if queue
                .patterns
                .iter()
                .any(|pattern| topic::matches(pattern, &event.name))
            {
                queue.events.push_back(event.clone());
                delivered += 1;
                debug!("事件 {} 投递到队列 {}", event.name, name);
            }
        }

        if delivered == 0 {
            debug!("事件 {} 无匹配订阅，被丢弃", event.name);
        }
        Ok(())
    }

    async fn subscribe(&self, queue: &str, pattern: &str) -> Result<()> {
        let mut queues = self.queues.write().await;
        let entry = queues.entry(queue.to_string()).or_default();
        if !entry.patterns.iter().any(|p| p == pattern) {
            entry.patterns.push(pattern.to_string());
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, max: usize) -> Result<Vec<Delivery>> {
        let mut queues = self.queues.write().await;
        let Some(entry) = queues.get_mut(queue) else {
            return Ok(vec![]);
        };

        let count = entry.events.len().min(max);
        let mut deliveries = Vec::with_capacity(count);
        for event in entry.events.drain(..count) {
            let ack_id = self.next_ack_id.fetch_add(1, Ordering::Relaxed);
            entry.unacked.insert(ack_id, event.clone());
            deliveries.push(Delivery { event, ack_id });
        }
        Ok(deliveries)
    }

    async fn ack(&self, queue: &str, ack_id: u64) -> Result<()> {
        let mut queues = self.queues.write().await;
        if let Some(entry) = queues.get_mut(queue) {
            entry.unacked.remove(&ack_id);
        }
        Ok(())
    }

    async fn nack(&self, queue: &str, ack_id: u64) -> Result<()> {
        let mut queues = self.queues.write().await;
        if let Some(entry) = queues.get_mut(queue) {
            if let Some(event) = entry.unacked.remove(&ack_id) {
                debug!("事件 {} 重新入队 {}", event.name, queue);
                entry.events.push_back(event);
            }
        }
        Ok(())
    }

    async fn queue_size(&self, queue: &str) -> Result<u64> {
        let queues = self.queues.read().await;
        Ok(queues.get(queue).map_or(0, |q| q.events.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_routes_by_pattern() {
        let bus = InMemoryEventBus::new();
        bus.subscribe("lifecycle", "jobs.*").await.unwrap();
        bus.subscribe("notify", "tasks.due").await.unwrap();

        bus.publish(&DomainEvent::new("jobs.due", serde_json::json!({})))
            .await
            .unwrap();
        bus.publish(&DomainEvent::new("tasks.due", serde_json::json!({})))
            .await
            .unwrap();
        bus.publish(&DomainEvent::new("tasks.repeated", serde_json::json!({})))
            .await
            .unwrap();

        assert_eq!(bus.queue_size("lifecycle").await.unwrap(), 1);
        assert_eq!(bus.queue_size("notify").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_consume_drains_fifo() {
        let bus = InMemoryEventBus::new();
        bus.subscribe("q", "jobs.#").await.unwrap();

        for i in 0..3 {
            bus.publish(&DomainEvent::new("jobs.due", serde_json::json!({ "i": i })))
                .await
                .unwrap();
        }

        let first = bus.consume("q", 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].event.payload["i"], 0);

        let rest = bus.consume("q", 10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert!(bus.consume("q", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nack_requeues_acked_is_gone() {
        let bus = InMemoryEventBus::new();
        bus.subscribe("q", "jobs.*").await.unwrap();

        bus.publish(&DomainEvent::new("jobs.due", serde_json::json!({ "i": 0 })))
            .await
            .unwrap();
        bus.publish(&DomainEvent::new("jobs.due", serde_json::json!({ "i": 1 })))
            .await
            .unwrap();

        let batch = bus.consume("q", 10).await.unwrap();
        assert_eq!(batch.len(), 2);
        // 未确认期间不会重复投递
        assert!(bus.consume("q", 10).await.unwrap().is_empty());

        bus.ack("q", batch[0].ack_id).await.unwrap();
        bus.nack("q", batch[1].ack_id).await.unwrap();

        // 只有被nack的投递回到队列
        let redelivered = bus.consume("q", 10).await.unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].event.payload["i"], 1);
    }

    #[tokio::test]
    async fn test_ack_unknown_id_is_noop() {
        let bus = InMemoryEventBus::new();
        bus.subscribe("q", "jobs.*").await.unwrap();
        bus.ack("q", 42).await.unwrap();
        bus.nack("q", 42).await.unwrap();
        assert_eq!(bus.queue_size("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_consume_unknown_queue_is_empty() {
        let bus = InMemoryEventBus::new();
        assert!(bus.consume("nope", 10).await.unwrap().is_empty());
        assert_eq!(bus.queue_size("nope").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_subscribe_is_idempotent() {
        let bus = InMemoryEventBus::new();
        bus.subscribe("q", "jobs.*").await.unwrap();
        bus.subscribe("q", "jobs.*").await.unwrap();

        bus.publish(&DomainEvent::new("jobs.due", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(bus.queue_size("q").await.unwrap(), 1);
    }
}
