//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use checkout::{CheckoutOrchestrator, CheckoutOutcome, TraceContext};
use domain::CheckoutRequest;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orchestrator: CheckoutOrchestrator,
}

impl AppState {
    pub fn new(orchestrator: CheckoutOrchestrator) -> Arc<Self> {
        Arc::new(Self { orchestrator })
    }
}

/// POST /checkout: places an order.
///
/// Completed and failed outcomes are both `200 OK`; the body says which. The
/// caller's `traceparent` and `baggage` headers are continued, or a new trace
/// is started when they are absent. A client that disconnects before payment
/// cancels the saga. A body that is not a well-formed request is a `400`.
#[tracing::instrument(skip_all, fields(idempotency_key = tracing::field::Empty))]
pub async fn place_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutOutcome>, ApiError> {
    let Json(request) = payload?;
    tracing::Span::current().record("idempotency_key", request.idempotency_key.as_str());
    let trace = TraceContext::extract(&headers);
    let outcome = state.orchestrator.place_order(request, trace).await?;
    Ok(Json(outcome))
}
