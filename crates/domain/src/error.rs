//! Domain error types.

use thiserror::Error;

/// Errors raised while constructing or combining checkout domain values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A request field failed validation.
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Currency code is not three ASCII letters.
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    /// Arithmetic between amounts in different currencies.
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    /// Units and nanos are inconsistent or out of range.
    #[error("Invalid money amount: {0}")]
    InvalidMoney(String),

    /// An amount no longer fits the representation.
    #[error("Money amount overflow")]
    Overflow,

    /// A cart line has a zero quantity.
    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: String, quantity: u32 },

    /// The cart has nothing to check out.
    #[error("Cart is empty")]
    EmptyCart,
}

impl DomainError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        DomainError::Validation {
            field,
            reason: reason.into(),
        }
    }
}
