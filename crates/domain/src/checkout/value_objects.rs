//! Value objects for the checkout domain.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of the shopper placing the order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a new user ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the user ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Product identifier (SKU).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a new product ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the product ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// E-mail address that receives the order confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Parses an address of the shape `local@domain.tld`.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, DomainError> {
        let raw = raw.as_ref().trim();
        let Some((local, domain)) = raw.split_once('@') else {
            return Err(DomainError::validation("email", "missing '@'"));
        };
        if local.is_empty() || domain.is_empty() {
            return Err(DomainError::validation("email", "empty local part or domain"));
        }
        if domain.contains('@') || raw.chars().any(char::is_whitespace) {
            return Err(DomainError::validation("email", "malformed address"));
        }
        if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
            return Err(DomainError::validation("email", "domain must contain a dot"));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shipping address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub zip_code: String,
}

impl Address {
    /// Checks that every component needed for delivery is present.
    ///
    /// `state` may be empty; many countries have no such subdivision.
    pub fn validate(&self) -> Result<(), DomainError> {
        let required = [
            ("address.street_address", &self.street_address),
            ("address.city", &self.city),
            ("address.country", &self.country),
            ("address.zip_code", &self.zip_code),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(DomainError::validation(field, "must not be empty"));
            }
        }
        Ok(())
    }
}

/// Opaque payment credential handed to the payment service.
///
/// Never printed: `Debug` and `Display` redact everything but the last four characters.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentToken(String);

impl PaymentToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token for the payment call.
    pub fn expose(&self) -> &str {
        &self.0
    }

    fn redacted(&self) -> String {
        let tail: String = self
            .0
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("****{tail}")
    }
}

impl std::fmt::Debug for PaymentToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PaymentToken").field(&self.redacted()).finish()
    }
}

impl std::fmt::Display for PaymentToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Client-supplied key that identifies one checkout attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub const MAX_LEN: usize = 128;

    pub fn new(key: impl Into<String>) -> Result<Self, DomainError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(DomainError::validation("idempotency_key", "must not be empty"));
        }
        if key.len() > Self::MAX_LEN {
            return Err(DomainError::validation(
                "idempotency_key",
                format!("longer than {} bytes", Self::MAX_LEN),
            ));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        IdempotencyKey::new(value)
    }
}

impl From<IdempotencyKey> for String {
    fn from(key: IdempotencyKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Address {
        Address {
            street_address: "1600 Amphitheatre Parkway".to_string(),
            city: "Mountain View".to_string(),
            state: "CA".to_string(),
            country: "US".to_string(),
            zip_code: "94043".to_string(),
        }
    }

    #[test]
    fn test_email_parse() {
        assert!(EmailAddress::parse("someone@example.com").is_ok());
        assert!(EmailAddress::parse("someone").is_err());
        assert!(EmailAddress::parse("@example.com").is_err());
        assert!(EmailAddress::parse("a@b@example.com").is_err());
        assert!(EmailAddress::parse("someone@localhost").is_err());
        assert!(EmailAddress::parse("some one@example.com").is_err());
    }

    #[test]
    fn test_address_requires_fields() {
        assert!(address().validate().is_ok());

        let mut no_state = address();
        no_state.state.clear();
        assert!(no_state.validate().is_ok());

        let mut no_city = address();
        no_city.city = "  ".to_string();
        assert!(matches!(
            no_city.validate(),
            Err(DomainError::Validation {
                field: "address.city",
                ..
            })
        ));
    }

    #[test]
    fn test_payment_token_is_redacted() {
        let token = PaymentToken::new("4432801561520454");
        assert_eq!(format!("{token}"), "****0454");
        assert!(!format!("{token:?}").contains("44328015"));
        assert_eq!(token.expose(), "4432801561520454");
    }

    #[test]
    fn test_idempotency_key_bounds() {
        assert!(IdempotencyKey::new("abc-123").is_ok());
        assert!(IdempotencyKey::new("").is_err());
        assert!(IdempotencyKey::new("k".repeat(129)).is_err());
        assert!(serde_json::from_str::<IdempotencyKey>("\"\"").is_err());
    }
}
