//! Currency conversion client.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{CurrencyCode, Money};
use tokio::sync::RwLock;

use super::{CallContext, Operation, Scripts};
use crate::error::ClientError;

/// Converts amounts between currencies.
#[async_trait]
pub trait CurrencyClient: Send + Sync {
    async fn convert(
        &self,
        ctx: CallContext,
        amount: &Money,
        to: &CurrencyCode,
    ) -> Result<Money, ClientError>;
}

/// In-memory converter using fixed rates quoted against EUR.
#[derive(Debug, Clone)]
pub struct InMemoryCurrencyClient {
    /// Units of the currency per one EUR.
    rates: Arc<RwLock<HashMap<String, f64>>>,
    scripts: Scripts,
}

const DEMO_RATES: [(&str, f64); 12] = [
    ("EUR", 1.0),
    ("USD", 1.1305),
    ("JPY", 126.40),
    ("GBP", 0.85970),
    ("CAD", 1.5128),
    ("CHF", 1.1360),
    ("AUD", 1.6072),
    ("SEK", 10.5375),
    ("NOK", 9.8040),
    ("PLN", 4.2996),
    ("INR", 79.4320),
    ("BRL", 4.2682),
];

impl InMemoryCurrencyClient {
    /// A converter that knows the demo rate table.
    pub fn new() -> Self {
        Self::with_rates(DEMO_RATES.iter().map(|(code, rate)| (code.to_string(), *rate)))
    }

    /// A converter with a custom rate table (units per one EUR).
    pub fn with_rates(rates: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self {
            rates: Arc::new(RwLock::new(rates.into_iter().collect())),
            scripts: Scripts::default(),
        }
    }

    pub fn scripts(&self) -> &Scripts {
        &self.scripts
    }

    pub async fn set_rate(&self, code: &CurrencyCode, per_eur: f64) {
        self.rates
            .write()
            .await
            .insert(code.as_str().to_string(), per_eur);
    }

    pub async fn supported(&self) -> Vec<String> {
        let mut codes: Vec<_> = self.rates.read().await.keys().cloned().collect();
        codes.sort();
        codes
    }
}

impl Default for InMemoryCurrencyClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CurrencyClient for InMemoryCurrencyClient {
    async fn convert(
        &self,
        ctx: CallContext,
        amount: &Money,
        to: &CurrencyCode,
    ) -> Result<Money, ClientError> {
        self.scripts.enter(Operation::Convert, &ctx).await?;

        if amount.currency() == to {
            return Ok(amount.clone());
        }

        let rates = self.rates.read().await;
        let rate = |code: &CurrencyCode| {
            rates.get(code.as_str()).copied().ok_or_else(|| {
                ClientError::permanent(
                    Operation::Convert,
                    format!("unsupported currency {code}"),
                )
            })
        };
        let from_rate = rate(amount.currency())?;
        let to_rate = rate(to)?;

        let euros = amount.as_f64() / from_rate;
        Money::from_f64(to.clone(), euros * to_rate)
            .map_err(|e| ClientError::permanent(Operation::Convert, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::propagation::TraceContext;
    use std::time::Duration;

    fn ctx() -> CallContext {
        CallContext::with_timeout(TraceContext::new_root(), Duration::from_secs(1))
    }

    fn code(c: &str) -> CurrencyCode {
        CurrencyCode::new(c).unwrap()
    }

    #[tokio::test]
    async fn test_same_currency_is_identity() {
        let client = InMemoryCurrencyClient::new();
        let amount = Money::from_cents(code("USD"), 1999);
        let converted = client.convert(ctx(), &amount, &code("USD")).await.unwrap();
        assert_eq!(converted, amount);
    }

    #[tokio::test]
    async fn test_converts_through_eur() {
        let client = InMemoryCurrencyClient::with_rates([
            ("EUR".to_string(), 1.0),
            ("USD".to_string(), 2.0),
            ("GBP".to_string(), 0.5),
        ]);
        let converted = client
            .convert(ctx(), &Money::from_units(code("USD"), 10), &code("GBP"))
            .await
            .unwrap();
        assert_eq!(converted, Money::from_cents(code("GBP"), 250));
    }

    #[tokio::test]
    async fn test_unknown_currency_is_permanent() {
        let client = InMemoryCurrencyClient::new();
        let err = client
            .convert(ctx(), &Money::from_units(code("USD"), 1), &code("XYZ"))
            .await
            .unwrap_err();
        assert_eq!(err.class, ErrorClass::Permanent);
        assert!(err.message.contains("XYZ"));
    }
}
