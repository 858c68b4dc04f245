//! HTTP surface for the Payment collaborator (spec §6).

use crate::service::PaymentService;
use apperror::AppError;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use model::PaymentRecord;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct PaymentState {
    pub service: Arc<dyn PaymentService>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessPaymentRequest {
    pub order_id: String,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct OrderIdQuery {
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub order_id: String,
}

pub fn router(state: PaymentState) -> Router {
    Router::new()
        .route("/payments", post(process_payment).get(get_payment))
        .route("/payments/refund", post(refund))
        .with_state(state)
}

async fn process_payment(
    State(state): State<PaymentState>,
    Json(body): Json<ProcessPaymentRequest>,
) -> Result<Json<PaymentRecord>, AppError> {
    let record = state
        .service
        .process_payment(&body.order_id, body.amount)
        .await?;
    Ok(Json(record))
}

async fn get_payment(
    State(state): State<PaymentState>,
    Query(query): Query<OrderIdQuery>,
) -> Result<Json<PaymentRecord>, AppError> {
    let record = state.service.get_payment(&query.order_id).await?;
    Ok(Json(record))
}

/// Best-effort refund, called by the Orchestrator's compensation subroutine
/// when a completed payment must be unwound (spec §4.2 step 6). Not part of
/// the spec's documented external interface list; added so compensation
/// with `refund=true` has somewhere to call.
async fn refund(
    State(state): State<PaymentState>,
    Json(body): Json<RefundRequest>,
) -> Result<Json<PaymentRecord>, AppError> {
    let record = state.service.refund(&body.order_id).await?;
    Ok(Json(record))
}
