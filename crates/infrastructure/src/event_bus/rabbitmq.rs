use async_trait::async_trait;
use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties,
    ExchangeKind,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use taskline_core::config::EventBusConfig;
use taskline_core::errors::{Result, TasklineError};
use taskline_core::models::DomainEvent;
use taskline_core::traits::{Delivery, EventBus};

/// RabbitMQ事件总线实现
///
/// 事件发布到topic交换机，路由键取事件名；订阅方声明持久化队列并按
/// 模式绑定，通配语义（`*`/`#`）由broker完成。消息持久化投递并等待
/// 发布确认。
pub struct RabbitMqEventBus {
    connection: Connection,
    channel: Arc<Mutex<Channel>>,
    exchange: String,
}

impl RabbitMqEventBus {
    /// 创建新的RabbitMQ事件总线实例并声明交换机
    pub async fn new(config: &EventBusConfig) -> Result<Self> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| TasklineError::EventBus(format!("连接RabbitMQ失败: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| TasklineError::EventBus(format!("创建通道失败: {e}")))?;

        // 不开启确认模式时publish返回的confirm会立即以未请求状态完成
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| TasklineError::EventBus(format!("开启发布确认失败: {e}")))?;

        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                TasklineError::EventBus(format!("声明交换机 {} 失败: {e}", config.exchange))
            })?;

        info!("成功连接到RabbitMQ: {}", config.url);

        Ok(Self {
            connection,
            channel: Arc::new(Mutex::new(channel)),
            exchange: config.exchange.clone(),
        })
    }

    /// 获取连接状态
    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// 关闭连接
    pub async fn close(&self) -> Result<()> {
        self.connection
            .close(200, "正常关闭")
            .await
            .map_err(|e| TasklineError::EventBus(format!("关闭连接失败: {e}")))?;

        info!("RabbitMQ连接已关闭");
        Ok(())
    }
}

#[async_trait]
impl EventBus for RabbitMqEventBus {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let channel = self.channel.lock().await;
        let payload = event.to_bytes()?;

        let confirm = channel
            .basic_publish(
                &self.exchange,
                &event.name,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2), // 2 = persistent
            )
            .await
            .map_err(|e| TasklineError::EventBus(format!("发布事件 {} 失败: {e}", event.name)))?;

        confirm
            .await
            .map_err(|e| TasklineError::EventBus(format!("事件发布确认失败: {e}")))?;

        debug!("事件已发布: {} ({})", event.name, event.id);
        Ok(())
    }

    async fn subscribe(&self, queue: &str, pattern: &str) -> Result<()> {
        let channel = self.channel.lock().await;

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| TasklineError::EventBus(format!("声明队列 {queue} 失败: {e}")))?;

        channel
            .queue_bind(
                queue,
                &self.exchange,
                pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                TasklineError::EventBus(format!("绑定队列 {queue} 到模式 {pattern} 失败: {e}"))
            })?;

        debug!("队列 {} 已绑定模式 {}", queue, pattern);
        Ok(())
    }

    async fn consume(&self, queue: &str, max: usize) -> Result<Vec<Delivery>> {
        let channel = self.channel.lock().await;
        let mut deliveries = Vec::new();

        while deliveries.len() < max {
            let get_result = channel.basic_get(queue, BasicGetOptions::default()).await;

            match get_result {
                Ok(Some(delivery)) => {
                    let event = DomainEvent::from_bytes(&delivery.data)?;
                    // 确认推迟到处理完成后，由调用方ack或nack
                    deliveries.push(Delivery {
                        event,
                        ack_id: delivery.delivery_tag,
                    });
                }
                Ok(None) => break,
                Err(e) => {
                    // 队列不存在按空处理，其余错误抛出
                    let error_msg = e.to_string();
                    if error_msg.contains("NOT_FOUND") || error_msg.contains("404") {
                        debug!("队列 {} 不存在，返回空结果", queue);
                        break;
                    }
                    return Err(TasklineError::EventBus(format!(
                        "从队列 {queue} 获取消息失败: {e}"
                    )));
                }
            }
        }

        Ok(deliveries)
    }

    async fn ack(&self, _queue: &str, ack_id: u64) -> Result<()> {
        let channel = self.channel.lock().await;
        channel
            .basic_ack(ack_id, BasicAckOptions::default())
            .await
            .map_err(|e| TasklineError::EventBus(format!("确认消息失败: {e}")))?;
        Ok(())
    }

    async fn nack(&self, _queue: &str, ack_id: u64) -> Result<()> {
        let channel = self.channel.lock().await;
        channel
            .basic_nack(
                ack_id,
                BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| TasklineError::EventBus(format!("消息重新入队失败: {e}")))?;
        Ok(())
    }

    async fn queue_size(&self, queue: &str) -> Result<u64> {
        let channel = self.channel.lock().await;
        let queue_info = channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await;

        match queue_info {
            Ok(info) => Ok(info.message_count() as u64),
            Err(e) => {
                let error_msg = e.to_string();
                if error_msg.contains("NOT_FOUND") || error_msg.contains("404") {
                    Ok(0)
                } else {
                    Err(TasklineError::EventBus(format!(
                        "获取队列 {queue} 信息失败: {e}"
                    )))
                }
            }
        }
    }
}
