//! Outbox poller (spec §4.3). Grounded on the original
//! `outbox_processor.go`: fixed tick, bounded batch, dispatch by
//! `event_type`, terminal status per row on each tick.

use model::{OutboxEvent, RollbackMessage};
use mq::MessageQueue;
use orchestrator::OutboxRepository;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

pub struct PublisherConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
}

/// Sink for the `outbox_pending_events` gauge (spec §6). Refreshed once per
/// tick with the size of the batch just fetched; a no-op by default.
pub trait OutboxMetrics: Send + Sync {
    fn set_pending(&self, count: i64);
}

struct NoopOutboxMetrics;

impl OutboxMetrics for NoopOutboxMetrics {
    fn set_pending(&self, _count: i64) {}
}

pub struct Publisher<R> {
    repo: Arc<R>,
    queue: Arc<dyn MessageQueue>,
    config: PublisherConfig,
    metrics: Arc<dyn OutboxMetrics>,
}

impl<R: OutboxRepository> Publisher<R> {
    pub fn new(repo: Arc<R>, queue: Arc<dyn MessageQueue>, config: PublisherConfig) -> Self {
        Self {
            repo,
            queue,
            config,
            metrics: Arc::new(NoopOutboxMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn OutboxMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Runs the poll loop until `shutdown` fires. In-flight ticks are
    /// allowed to complete; this is what spec §5's "done channel" signal
    /// maps to here.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.process_tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    #[cfg(test)]
    pub async fn process_tick_for_test(&self) {
        self.process_tick().await;
    }

    async fn process_tick(&self) {
        let events = match self.repo.fetch_pending(self.config.batch_size).await {
            Ok(events) => events,
            Err(err) => {
                error!(error = %err, "failed to fetch pending outbox events");
                return;
            }
        };
        self.metrics.set_pending(events.len() as i64);
        for event in events {
            self.process_event(event).await;
        }
    }

    async fn process_event(&self, event: OutboxEvent) {
        match event.event_type.as_str() {
            "InventoryRollback" => self.publish_rollback(event).await,
            other => {
                warn!(id = event.id, event_type = other, "unknown outbox event type, marking failed");
                if let Err(err) = self.repo.mark_failed(event.id).await {
                    error!(id = event.id, error = %err, "failed to mark outbox event failed");
                }
            }
        }
    }

    async fn publish_rollback(&self, event: OutboxEvent) {
        let decoded: Result<RollbackMessage, _> = serde_json::from_value(event.payload.clone());
        let message = match decoded {
            Ok(message) => message,
            Err(err) => {
                error!(id = event.id, error = %err, "outbox payload did not decode as RollbackMessage");
                if let Err(err) = self.repo.mark_failed(event.id).await {
                    error!(id = event.id, error = %err, "failed to mark outbox event failed");
                }
                return;
            }
        };

        let body = match serde_json::to_vec(&message) {
            Ok(body) => body,
            Err(err) => {
                error!(id = event.id, error = %err, "failed to encode rollback message");
                if let Err(err) = self.repo.mark_failed(event.id).await {
                    error!(id = event.id, error = %err, "failed to mark outbox event failed");
                }
                return;
            }
        };

        match self.queue.publish("inventory_rollback", body).await {
            Ok(()) => {
                if let Err(err) = self.repo.mark_processed(event.id).await {
                    error!(id = event.id, error = %err, "failed to mark outbox event processed");
                }
            }
            Err(err) => {
                // Transient publish failure: leave Pending for the next
                // tick rather than marking Failed.
                warn!(id = event.id, error = %err, "failed to publish rollback message, will retry next tick");
            }
        }
    }
}
