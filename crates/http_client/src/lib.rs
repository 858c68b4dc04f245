//! HTTP clients for the Inventory Authority and Payment collaborator.
//!
//! Grounded on the original service's `pkg/clients` package: every non-2xx
//! response is parsed as an [`apperror::ErrorEnvelope`] first, falling back
//! to a status-code guess when the peer didn't return one, and every
//! transport-level failure is classified by [`wrap_client_error`] into the
//! same taxonomy so the caller's retry logic never has to special-case
//! "is this a reqwest::Error or an AppError".

use apperror::{AppError, ErrorEnvelope};
use model::PaymentRecord;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;

/// Parses a non-2xx response body as an [`ErrorEnvelope`]; falls back to a
/// status-code-based guess if the body isn't one (e.g. a gateway's own error
/// page).
async fn handle_http_error(resp: Response) -> AppError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
        return AppError::new(envelope.error_type, envelope.code, envelope.message);
    }
    match status {
        StatusCode::BAD_REQUEST => AppError::invalid_input("invalid input"),
        StatusCode::NOT_FOUND => AppError::not_found("resource not found"),
        StatusCode::CONFLICT => AppError::conflict("resource conflict"),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT | StatusCode::SERVICE_UNAVAILABLE => {
            AppError::service_unavailable("service unavailable")
        }
        other => AppError::internal(format!("upstream service error: {other}")),
    }
}

/// Classifies a transport-level [`reqwest::Error`]: timeouts map to
/// `Timeout`, everything else (connection refused, DNS failure, ...) maps to
/// `ServiceUnavailable`, since both are retryable but mean different things
/// to an operator.
fn wrap_client_error(err: reqwest::Error, message: &str) -> AppError {
    if err.is_timeout() {
        AppError::timeout(format!("{message}: {err}"))
    } else {
        AppError::service_unavailable(format!("{message}: {err}"))
    }
}

/// Client for the Inventory Authority's HTTP surface.
pub struct InventoryClient {
    base_url: String,
    client: Client,
}

#[derive(Serialize)]
struct DecreaseRequest<'a> {
    sku: &'a str,
    quantity: i64,
    request_id: &'a str,
    order_id: &'a str,
    trace_id: &'a str,
}

#[derive(Serialize)]
struct IncreaseRequest<'a> {
    sku: &'a str,
    quantity: i64,
    trace_id: &'a str,
}

impl InventoryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        let resp = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| wrap_client_error(e, "failed to connect to inventory service"))?;
        if !resp.status().is_success() {
            return Err(handle_http_error(resp).await);
        }
        Ok(())
    }

    pub async fn decrease(
        &self,
        sku: &str,
        request_id: &str,
        order_id: &str,
        trace_id: &str,
        quantity: i64,
    ) -> Result<(), AppError> {
        let body = DecreaseRequest {
            sku,
            quantity,
            request_id,
            order_id,
            trace_id,
        };
        let resp = self
            .client
            .post(format!("{}/inventory/decrease", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| wrap_client_error(e, "failed to connect to inventory service"))?;
        if !resp.status().is_success() {
            return Err(handle_http_error(resp).await);
        }
        Ok(())
    }

    pub async fn increase(&self, sku: &str, quantity: i64, trace_id: &str) -> Result<(), AppError> {
        let body = IncreaseRequest {
            sku,
            quantity,
            trace_id,
        };
        let resp = self
            .client
            .post(format!("{}/inventory/increase", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| wrap_client_error(e, "failed to connect to inventory service"))?;
        if !resp.status().is_success() {
            return Err(handle_http_error(resp).await);
        }
        Ok(())
    }
}

/// Client for the Payment collaborator's HTTP surface.
pub struct PaymentClient {
    base_url: String,
    client: Client,
}

#[derive(Serialize)]
struct PaymentRequest<'a> {
    order_id: &'a str,
    amount: i64,
}

impl PaymentClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    pub async fn process_payment(
        &self,
        order_id: &str,
        amount: i64,
    ) -> Result<PaymentRecord, AppError> {
        let body = PaymentRequest { order_id, amount };
        let resp = self
            .client
            .post(format!("{}/payments", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| wrap_client_error(e, "failed to call payment service"))?;
        if !resp.status().is_success() {
            return Err(handle_http_error(resp).await);
        }
        resp.json()
            .await
            .map_err(|e| AppError::internal(format!("failed to decode payment response: {e}")))
    }

    pub async fn get_payment(&self, order_id: &str) -> Result<PaymentRecord, AppError> {
        let resp = self
            .client
            .get(format!("{}/payments", self.base_url))
            .query(&[("order_id", order_id)])
            .send()
            .await
            .map_err(|e| wrap_client_error(e, "failed to call payment service"))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(AppError::not_found("payment not found"));
        }
        if !resp.status().is_success() {
            return Err(handle_http_error(resp).await);
        }
        resp.json()
            .await
            .map_err(|e| AppError::internal(format!("failed to decode payment response: {e}")))
    }

    /// Best-effort refund for the compensation subroutine. Failures here are
    /// logged by the caller and never alter the outbox record (spec §4.2
    /// step 6).
    pub async fn refund(&self, order_id: &str) -> Result<PaymentRecord, AppError> {
        let body = RefundRequest { order_id };
        let resp = self
            .client
            .post(format!("{}/payments/refund", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| wrap_client_error(e, "failed to call payment service"))?;
        if !resp.status().is_success() {
            return Err(handle_http_error(resp).await);
        }
        resp.json()
            .await
            .map_err(|e| AppError::internal(format!("failed to decode payment response: {e}")))
    }
}

#[derive(Serialize)]
struct RefundRequest<'a> {
    order_id: &'a str,
}
