//! Thin seams over [`http_client`]'s concrete clients so the saga driver can
//! be exercised against fakes instead of live HTTP peers.

use apperror::AppError;
use async_trait::async_trait;
use http_client::{InventoryClient, PaymentClient};
use model::PaymentRecord;

#[async_trait]
pub trait InventoryPort: Send + Sync {
    async fn decrease(
        &self,
        sku: &str,
        request_id: &str,
        order_id: &str,
        trace_id: &str,
        quantity: i64,
    ) -> Result<(), AppError>;
}

#[async_trait]
pub trait PaymentPort: Send + Sync {
    async fn process_payment(&self, order_id: &str, amount: i64) -> Result<PaymentRecord, AppError>;
    async fn refund(&self, order_id: &str) -> Result<PaymentRecord, AppError>;
}

#[async_trait]
impl InventoryPort for InventoryClient {
    async fn decrease(
        &self,
        sku: &str,
        request_id: &str,
        order_id: &str,
        trace_id: &str,
        quantity: i64,
    ) -> Result<(), AppError> {
        InventoryClient::decrease(self, sku, request_id, order_id, trace_id, quantity).await
    }
}

#[async_trait]
impl PaymentPort for PaymentClient {
    async fn process_payment(&self, order_id: &str, amount: i64) -> Result<PaymentRecord, AppError> {
        PaymentClient::process_payment(self, order_id, amount).await
    }

    async fn refund(&self, order_id: &str) -> Result<PaymentRecord, AppError> {
        PaymentClient::refund(self, order_id).await
    }
}
