//! Shipping quote client.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{Address, CartItem, CurrencyCode, Money};
use tokio::sync::RwLock;

use super::{CallContext, Operation, Scripts};
use crate::error::ClientError;

/// Prices delivery of a set of items to an address.
#[async_trait]
pub trait QuoteClient: Send + Sync {
    async fn quote(
        &self,
        ctx: CallContext,
        address: &Address,
        items: &[CartItem],
    ) -> Result<Money, ClientError>;
}

/// In-memory quoter charging a flat rate for any non-empty shipment.
#[derive(Debug, Clone)]
pub struct InMemoryQuoteClient {
    flat_rate: Money,
    unserviceable: Arc<RwLock<HashSet<String>>>,
    scripts: Scripts,
}

impl InMemoryQuoteClient {
    pub fn new(flat_rate: Money) -> Self {
        Self {
            flat_rate,
            unserviceable: Arc::default(),
            scripts: Scripts::default(),
        }
    }

    /// The demo rate of 8.99 USD.
    pub fn demo() -> Result<Self, domain::DomainError> {
        Ok(Self::new(Money::new(
            CurrencyCode::new("USD")?,
            8,
            990_000_000,
        )?))
    }

    pub fn scripts(&self) -> &Scripts {
        &self.scripts
    }

    /// Rejects quotes to a country as out of range.
    pub async fn refuse_country(&self, country: impl Into<String>) {
        self.unserviceable
            .write()
            .await
            .insert(country.into().to_ascii_uppercase());
    }
}

#[async_trait]
impl QuoteClient for InMemoryQuoteClient {
    async fn quote(
        &self,
        ctx: CallContext,
        address: &Address,
        items: &[CartItem],
    ) -> Result<Money, ClientError> {
        self.scripts.enter(Operation::Quote, &ctx).await?;

        if self
            .unserviceable
            .read()
            .await
            .contains(&address.country.to_ascii_uppercase())
        {
            return Err(ClientError::permanent(
                Operation::Quote,
                format!("address out of range: no delivery to {}", address.country),
            ));
        }

        if items.iter().all(|item| item.quantity == 0) {
            return Ok(Money::zero(self.flat_rate.currency().clone()));
        }
        Ok(self.flat_rate.clone())
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

    fn address(country: &str) -> Address {
        Address {
            street_address: "1 Main St".into(),
            city: "Town".into(),
            state: String::new(),
            country: country.into(),
            zip_code: "00001".into(),
        }
    }

    #[tokio::test]
    async fn test_flat_rate() {
        let quoter = InMemoryQuoteClient::demo().unwrap();
        let cost = quoter
            .quote(ctx(), &address("US"), &[CartItem::new("A", 2)])
            .await
            .unwrap();
        assert_eq!(cost.to_string(), "8.99 USD");
    }

    #[tokio::test]
    async fn test_refused_country() {
        let quoter = InMemoryQuoteClient::demo().unwrap();
        quoter.refuse_country("aq").await;
        let err = quoter
            .quote(ctx(), &address("AQ"), &[CartItem::new("A", 1)])
            .await
            .unwrap_err();
        assert_eq!(err.class, ErrorClass::Permanent);
        assert!(err.message.contains("out of range"));
    }
}
