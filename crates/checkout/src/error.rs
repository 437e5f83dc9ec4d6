//! Checkout error types.

use domain::{DomainError, IdempotencyKey};
use event_log::EventLogError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clients::Operation;
use crate::state::SagaState;

/// How the orchestrator should react to a failed dependency call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Timeout, connection reset or a retryable status. Eligible for retry.
    Transient,

    /// Validation failure, decline, out of stock. Never retried.
    Permanent,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Permanent => write!(f, "permanent"),
        }
    }
}

/// A classified failure of one dependency call.
///
/// Errors forced by the fault policy carry `injected = true` but are handled
/// purely by their `class`, exactly like a real failure of that class.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed ({class}): {message}")]
pub struct ClientError {
    pub operation: Operation,
    pub class: ErrorClass,
    pub injected: bool,
    pub timed_out: bool,
    pub message: String,
}

impl ClientError {
    pub fn transient(operation: Operation, message: impl Into<String>) -> Self {
        Self {
            operation,
            class: ErrorClass::Transient,
            injected: false,
            timed_out: false,
            message: message.into(),
        }
    }

    pub fn permanent(operation: Operation, message: impl Into<String>) -> Self {
        Self {
            operation,
            class: ErrorClass::Permanent,
            injected: false,
            timed_out: false,
            message: message.into(),
        }
    }

    /// The caller's deadline elapsed before the call returned.
    pub fn timeout(operation: Operation) -> Self {
        Self {
            timed_out: true,
            ..Self::transient(operation, "deadline exceeded")
        }
    }

    /// A synthetic failure produced by the fault policy.
    pub fn injected(operation: Operation, class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            operation,
            class,
            injected: true,
            timed_out: false,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class == ErrorClass::Transient
    }

    /// Converts an exhausted transient error into a permanent one.
    pub fn escalate(self, attempts: u32) -> Self {
        match self.class {
            ErrorClass::Permanent => self,
            ErrorClass::Transient => Self {
                class: ErrorClass::Permanent,
                message: format!(
                    "gave up after {attempts} attempt{}: {}",
                    if attempts == 1 { "" } else { "s" },
                    self.message
                ),
                ..self
            },
        }
    }
}

/// Errors raised by the saga state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SagaError {
    /// The requested transition is not an edge of the state graph.
    #[error("Invalid saga transition from {from} to {to}")]
    InvalidTransition { from: SagaState, to: SagaState },

    /// A terminal event was requested before the saga finished.
    #[error("Saga is not terminal: {0}")]
    NotTerminal(SagaState),

    /// A completed saga is missing data it must carry.
    #[error("Saga is missing {0}")]
    Missing(&'static str),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

/// Errors returned to the caller of `place_order`.
///
/// Business failures are not errors: they come back as a failed outcome.
#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    /// The request is malformed.
    #[error("Invalid request: {0}")]
    Validation(#[from] DomainError),

    /// The key was already used for a different request.
    #[error("Idempotency key {0} was reused with a different request")]
    IdempotencyConflict(IdempotencyKey),

    /// The caller went away before payment and the saga was aborted.
    #[error("Checkout cancelled before payment")]
    Cancelled,

    /// A duplicate request gave up waiting for the original to finish.
    #[error("Timed out waiting for in-flight checkout {0}")]
    InFlightTimeout(IdempotencyKey),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure to get an order event onto the log.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Retries ran out while the log stayed unavailable.
    #[error("Publish failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: EventLogError,
    },

    /// The log refused the record outright.
    #[error("Publish rejected: {0}")]
    Rejected(#[source] EventLogError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalate_transient() {
        let err = ClientError::timeout(Operation::Quote).escalate(3);
        assert_eq!(err.class, ErrorClass::Permanent);
        assert!(err.timed_out);
        assert!(err.message.contains("3 attempts"));
    }

    #[test]
    fn test_escalate_keeps_permanent() {
        let err = ClientError::permanent(Operation::Charge, "card declined");
        assert_eq!(err.clone().escalate(5), err);
    }

    #[test]
    fn test_injected_keeps_class() {
        let err = ClientError::injected(Operation::Convert, ErrorClass::Transient, "chaos");
        assert!(err.injected);
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "convert failed (transient): chaos");
    }
}
