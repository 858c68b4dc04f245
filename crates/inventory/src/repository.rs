//! PostgreSQL repository for the Inventory Authority.
//!
//! Grounded on the teacher's `crates/repository`: traits exposing both a
//! pool-backed and a transaction-scoped entry point per operation, raw SQL
//! via `tokio_postgres`. The conditional `UPDATE ... WHERE quantity >= $n`
//! in [`PgInventoryRepository::decrease_tx`] is the one piece of SQL this
//! whole workspace depends on for correctness under concurrency.

use apperror::AppError;
use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::Pool;
use model::{DeductionLog, InventoryRecord};
use tokio_postgres::error::SqlState;
use tokio_postgres::Transaction;

fn is_unique_violation(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&SqlState::UNIQUE_VIOLATION)
}

/// Outcome of a conditional decrement attempt.
pub enum DecreaseOutcome {
    Applied,
    InsufficientStock,
    NotFound,
}

#[async_trait]
pub trait InventoryRepository: Send + Sync {
    async fn get_by_sku(&self, sku: &str) -> Result<InventoryRecord, AppError>;
    async fn list(&self, product_id: Option<&str>) -> Result<Vec<InventoryRecord>, AppError>;
    async fn create(&self, record: &InventoryRecord) -> Result<(), AppError>;
    async fn deduction_log_exists(&self, request_id: &str) -> Result<bool, AppError>;

    /// Begins a transaction, attempts the conditional decrement and the
    /// deduction-log insert, and commits. Returns `Ok(Applied)` only if both
    /// effects are durable; any other outcome leaves no trace.
    async fn decrease(
        &self,
        request_id: &str,
        order_id: &str,
        sku: &str,
        trace_id: &str,
        quantity: i64,
    ) -> Result<DecreaseOutcome, AppError>;

    async fn increase(&self, sku: &str, quantity: i64, trace_id: &str) -> Result<(), AppError>;
}

pub struct PgInventoryRepository {
    pool: Pool,
}

impl PgInventoryRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn decrease_tx(
        tx: &Transaction<'_>,
        sku: &str,
        quantity: i64,
    ) -> Result<DecreaseOutcome, AppError> {
        let updated = tx
            .execute(
                "UPDATE inventories SET quantity = quantity - $2 WHERE sku = $1 AND quantity >= $2",
                &[&sku, &quantity],
            )
            .await?;
        if updated == 1 {
            return Ok(DecreaseOutcome::Applied);
        }
        let exists = tx
            .query_opt("SELECT 1 FROM inventories WHERE sku = $1", &[&sku])
            .await?;
        if exists.is_none() {
            Ok(DecreaseOutcome::NotFound)
        } else {
            Ok(DecreaseOutcome::InsufficientStock)
        }
    }

    async fn insert_deduction_log_tx(
        tx: &Transaction<'_>,
        log: &DeductionLog,
    ) -> Result<(), tokio_postgres::Error> {
        tx.execute(
            "INSERT INTO inventory_deduction_logs (request_id, order_id, sku, trace_id, quantity, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &log.request_id,
                &log.order_id,
                &log.sku,
                &log.trace_id,
                &log.quantity,
                &log.created_at,
            ],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl InventoryRepository for PgInventoryRepository {
    async fn get_by_sku(&self, sku: &str) -> Result<InventoryRecord, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT sku, product_id, quantity FROM inventories WHERE sku = $1",
                &[&sku],
            )
            .await?;
        match row {
            Some(row) => Ok(InventoryRecord {
                sku: row.get("sku"),
                product_id: row.get("product_id"),
                quantity: row.get("quantity"),
            }),
            None => Err(AppError::not_found(format!("sku '{sku}' not found"))),
        }
    }

    async fn list(&self, product_id: Option<&str>) -> Result<Vec<InventoryRecord>, AppError> {
        let client = self.pool.get().await?;
        let rows = match product_id {
            Some(pid) => {
                client
                    .query(
                        "SELECT sku, product_id, quantity FROM inventories WHERE product_id = $1 ORDER BY sku",
                        &[&pid],
                    )
                    .await?
            }
            None => {
                client
                    .query(
                        "SELECT sku, product_id, quantity FROM inventories ORDER BY sku",
                        &[],
                    )
                    .await?
            }
        };
        Ok(rows
            .into_iter()
            .map(|row| InventoryRecord {
                sku: row.get("sku"),
                product_id: row.get("product_id"),
                quantity: row.get("quantity"),
            })
            .collect())
    }

    async fn create(&self, record: &InventoryRecord) -> Result<(), AppError> {
        let client = self.pool.get().await?;
        let result = client
            .execute(
                "INSERT INTO inventories (sku, product_id, quantity) VALUES ($1, $2, $3)",
                &[&record.sku, &record.product_id, &record.quantity],
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(AppError::conflict(format!("sku '{}' already exists", record.sku)))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn deduction_log_exists(&self, request_id: &str) -> Result<bool, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT 1 FROM inventory_deduction_logs WHERE request_id = $1",
                &[&request_id],
            )
            .await?;
        Ok(row.is_some())
    }

    async fn decrease(
        &self,
        request_id: &str,
        order_id: &str,
        sku: &str,
        trace_id: &str,
        quantity: i64,
    ) -> Result<DecreaseOutcome, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let outcome = Self::decrease_tx(&tx, sku, quantity).await?;
        if !matches!(outcome, DecreaseOutcome::Applied) {
            return Ok(outcome);
        }

        let log = DeductionLog {
            request_id: request_id.to_string(),
            order_id: order_id.to_string(),
            sku: sku.to_string(),
            trace_id: trace_id.to_string(),
            quantity,
            created_at: Utc::now(),
        };
        if let Err(err) = Self::insert_deduction_log_tx(&tx, &log).await {
            if is_unique_violation(&err) {
                // Lost the idempotency race: another attempt with the same
                // request_id committed first. The decrement we just made
                // will be rolled back when `tx` drops without a commit.
                return Err(AppError::conflict("duplicate request_id"));
            }
            return Err(err.into());
        }

        tx.commit().await?;
        Ok(DecreaseOutcome::Applied)
    }

    async fn increase(&self, sku: &str, quantity: i64, _trace_id: &str) -> Result<(), AppError> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE inventories SET quantity = quantity + $2 WHERE sku = $1",
                &[&sku, &quantity],
            )
            .await?;
        if updated == 0 {
            return Err(AppError::not_found(format!("sku '{sku}' not found")));
        }
        Ok(())
    }
}
