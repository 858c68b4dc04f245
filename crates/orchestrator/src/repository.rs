//! PostgreSQL repositories for the Orchestrator: the `orders` aggregate and
//! its co-owned `outbox_events` table.
//!
//! Grounded on the original `order_repository.go`'s
//! `UPDATE ... WHERE order_id = ? AND status != ?` guard (here widened to
//! take the target status as the non-equality operand, giving monotonic
//! forward-only transitions rather than mere no-op suppression) and on
//! `outbox_processor.go`'s pending-batch fetch shape.

use apperror::AppError;
use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::Pool;
use model::{Order, OrderStatus, OutboxEvent, OutboxStatus};
use serde_json::Value;

fn status_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Created => "Created",
        OrderStatus::InventoryReserved => "InventoryReserved",
        OrderStatus::Paid => "Paid",
        OrderStatus::Completed => "Completed",
        OrderStatus::Failed => "Failed",
    }
}

fn parse_status(s: &str) -> OrderStatus {
    match s {
        "InventoryReserved" => OrderStatus::InventoryReserved,
        "Paid" => OrderStatus::Paid,
        "Completed" => OrderStatus::Completed,
        "Failed" => OrderStatus::Failed,
        _ => OrderStatus::Created,
    }
}

fn row_to_order(row: &tokio_postgres::Row) -> Order {
    Order {
        order_id: row.get("order_id"),
        user_id: row.get("user_id"),
        sku: row.get("sku"),
        quantity: row.get("quantity"),
        unit_price: row.get("unit_price"),
        total_amount: row.get("total_amount"),
        trace_id: row.get("trace_id"),
        status: parse_status(row.get("status")),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_outbox_event(row: &tokio_postgres::Row) -> Result<OutboxEvent, AppError> {
    let status: &str = row.get("status");
    let status = match status {
        "Processed" => OutboxStatus::Processed,
        "Failed" => OutboxStatus::Failed,
        _ => OutboxStatus::Pending,
    };
    let payload: Value = row.get("payload");
    Ok(OutboxEvent {
        id: row.get("id"),
        aggregate_type: row.get("aggregate_type"),
        aggregate_id: row.get("aggregate_id"),
        event_type: row.get("event_type"),
        payload,
        status,
        trace_id: row.get("trace_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(&self, order: &Order) -> Result<(), AppError>;
    async fn get_by_order_id(&self, order_id: &str) -> Result<Order, AppError>;

    /// Plain forward transition, no accompanying outbox write. Returns
    /// `false` (not an error) if the row was already in `status` or beyond —
    /// the monotonicity guard makes this a safe no-op under replay.
    async fn update_status(&self, order_id: &str, status: OrderStatus) -> Result<bool, AppError>;

    /// The saga's compensation step: transitions the order to `Failed` and
    /// inserts an `InventoryRollback` outbox row in one transaction. Either
    /// both land or neither does.
    async fn fail_with_rollback_outbox(
        &self,
        order_id: &str,
        trace_id: &str,
        sku: &str,
        quantity: i64,
    ) -> Result<(), AppError>;
}

pub struct PgOrderRepository {
    pool: Pool,
}

impl PgOrderRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create(&self, order: &Order) -> Result<(), AppError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO orders
                    (order_id, user_id, sku, quantity, unit_price, total_amount, trace_id, status, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)",
                &[
                    &order.order_id,
                    &order.user_id,
                    &order.sku,
                    &order.quantity,
                    &order.unit_price,
                    &order.total_amount,
                    &order.trace_id,
                    &status_str(order.status),
                    &order.created_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn get_by_order_id(&self, order_id: &str) -> Result<Order, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT order_id, user_id, sku, quantity, unit_price, total_amount, trace_id, status, created_at, updated_at
                 FROM orders WHERE order_id = $1",
                &[&order_id],
            )
            .await?;
        row.as_ref()
            .map(row_to_order)
            .ok_or_else(|| AppError::not_found(format!("order '{order_id}' not found")))
    }

    async fn update_status(&self, order_id: &str, status: OrderStatus) -> Result<bool, AppError> {
        let client = self.pool.get().await?;
        let now = Utc::now();
        let updated = client
            .execute(
                "UPDATE orders SET status = $2, updated_at = $3 WHERE order_id = $1 AND status != $2",
                &[&order_id, &status_str(status), &now],
            )
            .await?;
        Ok(updated == 1)
    }

    async fn fail_with_rollback_outbox(
        &self,
        order_id: &str,
        trace_id: &str,
        sku: &str,
        quantity: i64,
    ) -> Result<(), AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let now = Utc::now();

        tx.execute(
            "UPDATE orders SET status = $2, updated_at = $3 WHERE order_id = $1 AND status != $2",
            &[&order_id, &status_str(OrderStatus::Failed), &now],
        )
        .await?;

        let payload = serde_json::json!({
            "sku": sku,
            "quantity": quantity,
            "trace_id": trace_id,
        });
        tx.execute(
            "INSERT INTO outbox_events
                (aggregate_type, aggregate_id, event_type, payload, status, trace_id, created_at, updated_at)
             VALUES ('Order', $1, 'InventoryRollback', $2, 'Pending', $3, $4, $4)",
            &[&order_id, &payload, &trace_id, &now],
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<OutboxEvent>, AppError>;
    async fn mark_processed(&self, id: i64) -> Result<(), AppError>;
    async fn mark_failed(&self, id: i64) -> Result<(), AppError>;
}

pub struct PgOutboxRepository {
    pool: Pool,
}

impl PgOutboxRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxRepository for PgOutboxRepository {
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<OutboxEvent>, AppError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, aggregate_type, aggregate_id, event_type, payload, status, trace_id, created_at, updated_at
                 FROM outbox_events WHERE status = 'Pending' ORDER BY created_at ASC LIMIT $1",
                &[&limit],
            )
            .await?;
        rows.iter().map(row_to_outbox_event).collect()
    }

    async fn mark_processed(&self, id: i64) -> Result<(), AppError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE outbox_events SET status = 'Processed', updated_at = $2 WHERE id = $1",
                &[&id, &Utc::now()],
            )
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: i64) -> Result<(), AppError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE outbox_events SET status = 'Failed', updated_at = $2 WHERE id = $1",
                &[&id, &Utc::now()],
            )
            .await?;
        Ok(())
    }
}
