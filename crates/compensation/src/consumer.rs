//! Inventory rollback consumer (spec §4.3). Grounded on the original
//! `compensator.go`: subscribes to `inventory_rollback` and calls
//! `Inventory.Increase`. Decode failures are dropped; handler failures are
//! retried by the queue's own capped-backoff machinery (see `mq`).

use apperror::AppError;
use http_client::InventoryClient;
use model::RollbackMessage;
use mq::MessageQueue;
use std::sync::Arc;
use tracing::{error, info};

pub async fn start(queue: Arc<dyn MessageQueue>, inventory: Arc<InventoryClient>) -> Result<(), AppError> {
    let handler: mq::Handler = Arc::new(move |payload| {
        let inventory = inventory.clone();
        Box::pin(async move {
            let message: RollbackMessage = match serde_json::from_slice(&payload) {
                Ok(message) => message,
                Err(err) => {
                    error!(error = %err, "malformed rollback message, dropping");
                    return Ok(());
                }
            };
            match inventory
                .increase(&message.sku, message.quantity, &message.trace_id)
                .await
            {
                Ok(()) => {
                    info!(sku = %message.sku, quantity = message.quantity, "inventory rollback applied");
                    Ok(())
                }
                Err(err) => Err(anyhow::anyhow!(err)),
            }
        })
    });

    queue
        .subscribe("inventory_rollback", handler)
        .await
        .map_err(|err| AppError::internal(format!("failed to subscribe to inventory_rollback: {err}")))
}
