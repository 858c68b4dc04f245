//! Minimal publish/subscribe message bus abstraction.
//!
//! Grounded on the original service's `pkg/async` package: a small
//! [`MessageQueue`] trait with an in-memory implementation for local runs and
//! tests, and a durable AMQP implementation for production. [`connect_or_memory`]
//! probes the broker at startup and falls back to the in-memory queue rather
//! than failing to start, exactly as the original `NewRabbitMQOrMemory` does.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection, ConnectionProperties};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// A handler invoked once per message. Returning `Err` causes the message to
/// be retried with backoff rather than dropped.
pub type Handler =
    Arc<dyn Fn(Vec<u8>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;
    /// Registers `handler` for `topic`. At most one subscriber per topic per
    /// queue instance; a second call on the same topic is an error.
    async fn subscribe(&self, topic: &str, handler: Handler) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// Retries `handler` against `msg` with capped exponential backoff until it
/// succeeds. There is no dead-letter path: a poison message retries forever,
/// matching the original's documented "retry indefinitely" behavior.
async fn retry_until_success(
    handler: Handler,
    msg: Vec<u8>,
    topic: String,
    initial_backoff: Duration,
    max_backoff: Duration,
) {
    let mut backoff = initial_backoff;
    loop {
        match handler(msg.clone()).await {
            Ok(()) => return,
            Err(err) => {
                warn!(
                    %topic,
                    error = %err,
                    backoff_secs = backoff.as_secs(),
                    "handler failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, max_backoff);
            }
        }
    }
}

/// In-memory [`MessageQueue`], one unbounded set of bounded (capacity 100)
/// channels keyed by topic. Used for tests and as the fallback when no
/// broker is reachable at startup.
pub struct MemoryQueue {
    topics: Mutex<HashMap<String, (mpsc::Sender<Vec<u8>>, Option<mpsc::Receiver<Vec<u8>>>)>>,
    closed: Arc<AtomicBool>,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl MemoryQueue {
    pub fn new(initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            closed: Arc::new(AtomicBool::new(false)),
            initial_backoff,
            max_backoff,
        }
    }

    fn sender_for(&self, topic: &str) -> mpsc::Sender<Vec<u8>> {
        let mut topics = self.topics.lock().unwrap();
        if let Some((tx, _)) = topics.get(topic) {
            return tx.clone();
        }
        let (tx, rx) = mpsc::channel(100);
        topics.insert(topic.to_string(), (tx.clone(), Some(rx)));
        tx
    }

    fn take_receiver(&self, topic: &str) -> Option<mpsc::Receiver<Vec<u8>>> {
        let mut topics = self.topics.lock().unwrap();
        topics.get_mut(topic).and_then(|(_, rx)| rx.take())
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(anyhow!("queue is closed"));
        }
        let tx = self.sender_for(topic);
        tx.try_send(payload)
            .map_err(|_| anyhow!("queue is full or closed"))
    }

    async fn subscribe(&self, topic: &str, handler: Handler) -> Result<()> {
        self.sender_for(topic);
        let mut rx = self
            .take_receiver(topic)
            .ok_or_else(|| anyhow!("topic '{topic}' already has a subscriber"))?;
        let topic = topic.to_string();
        let closed = self.closed.clone();
        let initial_backoff = self.initial_backoff;
        let max_backoff = self.max_backoff;

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if closed.load(Ordering::SeqCst) {
                    break;
                }
                let handler = handler.clone();
                let topic = topic.clone();
                tokio::spawn(retry_until_success(
                    handler,
                    msg,
                    topic,
                    initial_backoff,
                    max_backoff,
                ));
            }
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Durable [`MessageQueue`] backed by an AMQP broker (RabbitMQ).
pub struct AmqpQueue {
    connection: Connection,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl AmqpQueue {
    pub async fn connect(
        url: &str,
        initial_backoff: Duration,
        max_backoff: Duration,
    ) -> Result<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        Ok(Self {
            connection,
            initial_backoff,
            max_backoff,
        })
    }
}

#[async_trait]
impl MessageQueue for AmqpQueue {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let channel = self.connection.create_channel().await?;
        let queue = channel
            .queue_declare(
                topic,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .basic_publish(
                "",
                queue.name().as_str(),
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2), // persistent
            )
            .await?
            .await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: Handler) -> Result<()> {
        let channel = self.connection.create_channel().await?;
        let queue = channel
            .queue_declare(
                topic,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let mut consumer = channel
            .basic_consume(
                queue.name().as_str(),
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let topic = topic.to_string();
        let initial_backoff = self.initial_backoff;
        let max_backoff = self.max_backoff;

        tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                let delivery = match delivery {
                    Ok(d) => d,
                    Err(err) => {
                        error!(%topic, error = %err, "amqp delivery error");
                        continue;
                    }
                };
                let body = delivery.data.clone();
                retry_until_success(
                    handler.clone(),
                    body,
                    topic.clone(),
                    initial_backoff,
                    max_backoff,
                )
                .await;
                if let Err(err) = delivery.ack(BasicAckOptions::default()).await {
                    error!(%topic, error = %err, "failed to ack message");
                }
            }
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.connection.close(0, "shutting down").await?;
        Ok(())
    }
}

/// Probes `url`, returning a durable [`AmqpQueue`] on success or logging a
/// warning and falling back to an in-memory queue, mirroring
/// `NewRabbitMQOrMemory` from the original.
pub async fn connect_or_memory(
    url: &str,
    initial_backoff: Duration,
    max_backoff: Duration,
) -> Arc<dyn MessageQueue> {
    match AmqpQueue::connect(url, initial_backoff, max_backoff).await {
        Ok(queue) => {
            info!("connected to AMQP broker");
            Arc::new(queue)
        }
        Err(err) => {
            warn!(error = %err, "failed to connect to AMQP broker, falling back to in-memory queue");
            Arc::new(MemoryQueue::new(initial_backoff, max_backoff))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn handler_counting(counter: Arc<AtomicU32>, fail_until: u32) -> Handler {
        Arc::new(move |_payload| {
            let counter = counter.clone();
            Box::pin(async move {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt <= fail_until {
                    Err(anyhow!("simulated failure"))
                } else {
                    Ok(())
                }
            })
        })
    }

    #[tokio::test]
    async fn publish_then_subscribe_delivers_message() {
        let queue = MemoryQueue::new(Duration::from_millis(1), Duration::from_millis(5));
        let counter = Arc::new(AtomicU32::new(0));
        queue
            .subscribe("inventory_rollback", handler_counting(counter.clone(), 0))
            .await
            .unwrap();
        queue
            .publish("inventory_rollback", b"payload".to_vec())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_is_retried_until_it_succeeds() {
        let queue = MemoryQueue::new(Duration::from_millis(1), Duration::from_millis(5));
        let counter = Arc::new(AtomicU32::new(0));
        queue
            .subscribe("inventory_rollback", handler_counting(counter.clone(), 2))
            .await
            .unwrap();
        queue
            .publish("inventory_rollback", b"payload".to_vec())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn second_subscribe_on_same_topic_errors() {
        let queue = MemoryQueue::default();
        let counter = Arc::new(AtomicU32::new(0));
        queue
            .subscribe("topic", handler_counting(counter.clone(), 0))
            .await
            .unwrap();
        let result = queue
            .subscribe("topic", handler_counting(counter, 0))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn close_marks_queue_unusable() {
        let queue = MemoryQueue::default();
        queue.close().await.unwrap();
        let result = queue.publish("topic", b"x".to_vec()).await;
        assert!(result.is_err());
    }
}
