use serde::{Deserialize, Serialize};

use super::money::CurrencyCode;
use super::value_objects::{Address, EmailAddress, IdempotencyKey, PaymentToken, UserId};
use crate::error::DomainError;

/// A request to place an order.
///
/// Immutable once accepted. Deserialization already enforces the currency code and
/// idempotency key shapes; [`CheckoutRequest::validate`] checks the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub user_currency: CurrencyCode,
    pub address: Address,
    pub email: EmailAddress,
    pub payment_token: PaymentToken,
    pub idempotency_key: IdempotencyKey,
}

impl CheckoutRequest {
    /// Validates every field of the request.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.user_id.as_str().trim().is_empty() {
            return Err(DomainError::validation("user_id", "must not be empty"));
        }
        self.address.validate()?;
        EmailAddress::parse(self.email.as_str())?;
        if self.payment_token.expose().trim().is_empty() {
            return Err(DomainError::validation("payment_token", "must not be empty"));
        }
        Ok(())
    }

    /// Identifies the logical request behind an idempotency key.
    ///
    /// Two submissions sharing a key must agree on this value, or the second is a
    /// conflicting reuse of the key.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}|{}|{}",
            self.user_id,
            self.user_currency,
            self.email.as_str().to_ascii_lowercase()
        )
    }
}
