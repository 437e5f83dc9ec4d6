//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use checkout::fault::FaultPolicyError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout could not run to an outcome of its own.
    Checkout(CheckoutError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    match &err {
        CheckoutError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        CheckoutError::IdempotencyConflict(_) => (StatusCode::CONFLICT, err.to_string()),
        CheckoutError::Cancelled | CheckoutError::InFlightTimeout(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        CheckoutError::Internal(_) => {
            tracing::error!(error = %err, "checkout failed internally");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<FaultPolicyError> for ApiError {
    fn from(err: FaultPolicyError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

/// Malformed JSON, a missing field or a mistyped one are all client errors.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
