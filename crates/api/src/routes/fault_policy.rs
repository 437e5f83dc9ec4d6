//! Fault policy inspection and replacement.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use checkout::FaultPolicy;
use serde::Serialize;

use super::checkout::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct ReplacedResponse {
    pub version: u64,
    pub previous_version: u64,
    pub rules: usize,
}

/// GET /fault-policy: returns the policy currently in force.
pub async fn get(State(state): State<Arc<AppState>>) -> Json<FaultPolicy> {
    Json(state.orchestrator.faults().snapshot().as_ref().clone())
}

/// PUT /fault-policy: swaps in a new policy.
///
/// Calls already past their fault decision keep the old policy.
#[tracing::instrument(skip_all)]
pub async fn put(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FaultPolicy>, JsonRejection>,
) -> Result<Json<ReplacedResponse>, ApiError> {
    let Json(policy) = payload?;
    policy.validate()?;
    let version = policy.version;
    let rules = policy.rules.len();
    let previous = state.orchestrator.faults().replace(policy);

    Ok(Json(ReplacedResponse {
        version,
        previous_version: previous.version,
        rules,
    }))
}
