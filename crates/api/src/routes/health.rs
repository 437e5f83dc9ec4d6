//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::checkout::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub fault_policy_version: u64,
    pub fault_rules: usize,
    pub tracked_checkouts: usize,
}

/// GET /health: returns process health plus the active fault policy.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let policy = state.orchestrator.faults().snapshot();
    Json(HealthResponse {
        status: "ok",
        fault_policy_version: policy.version,
        fault_rules: policy.rules.len(),
        tracked_checkouts: state.orchestrator.registry().len(),
    })
}
