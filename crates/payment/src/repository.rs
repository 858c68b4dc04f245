//! PostgreSQL repository for the Payment collaborator.

use apperror::AppError;
use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::Pool;
use model::{PaymentRecord, PaymentStatus};

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create_pending(&self, order_id: &str, amount: i64) -> Result<(), AppError>;

    async fn update_status(
        &self,
        order_id: &str,
        status: PaymentStatus,
        transaction_id: Option<&str>,
    ) -> Result<PaymentRecord, AppError>;

    async fn get_by_order_id(&self, order_id: &str) -> Result<PaymentRecord, AppError>;
}

pub struct PgPaymentRepository {
    pool: Pool,
}

impl PgPaymentRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn status_str(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => "Pending",
        PaymentStatus::Completed => "Completed",
        PaymentStatus::Failed => "Failed",
        PaymentStatus::Refunded => "Refunded",
    }
}

fn parse_status(s: &str) -> PaymentStatus {
    match s {
        "Completed" => PaymentStatus::Completed,
        "Failed" => PaymentStatus::Failed,
        "Refunded" => PaymentStatus::Refunded,
        _ => PaymentStatus::Pending,
    }
}

#[async_trait]
impl PaymentRepository for PgPaymentRepository {
    async fn create_pending(&self, order_id: &str, amount: i64) -> Result<(), AppError> {
        let client = self.pool.get().await?;
        let now = Utc::now();
        client
            .execute(
                "INSERT INTO payments (order_id, amount, status, transaction_id, created_at, updated_at)
                 VALUES ($1, $2, 'Pending', NULL, $3, $3)",
                &[&order_id, &amount, &now],
            )
            .await?;
        Ok(())
    }

    async fn update_status(
        &self,
        order_id: &str,
        status: PaymentStatus,
        transaction_id: Option<&str>,
    ) -> Result<PaymentRecord, AppError> {
        let client = self.pool.get().await?;
        let now = Utc::now();
        let row = client
            .query_opt(
                "UPDATE payments SET status = $2, transaction_id = $3, updated_at = $4
                 WHERE order_id = $1
                 RETURNING order_id, amount, status, transaction_id, created_at, updated_at",
                &[&order_id, &status_str(status), &transaction_id, &now],
            )
            .await?;
        match row {
            Some(row) => Ok(PaymentRecord {
                order_id: row.get("order_id"),
                amount: row.get("amount"),
                status: parse_status(row.get("status")),
                transaction_id: row.get("transaction_id"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            }),
            None => Err(AppError::not_found(format!(
                "payment for order '{order_id}' not found"
            ))),
        }
    }

    async fn get_by_order_id(&self, order_id: &str) -> Result<PaymentRecord, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT order_id, amount, status, transaction_id, created_at, updated_at
                 FROM payments WHERE order_id = $1",
                &[&order_id],
            )
            .await?;
        match row {
            Some(row) => Ok(PaymentRecord {
                order_id: row.get("order_id"),
                amount: row.get("amount"),
                status: parse_status(row.get("status")),
                transaction_id: row.get("transaction_id"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            }),
            None => Err(AppError::not_found(format!(
                "payment for order '{order_id}' not found"
            ))),
        }
    }
}
