//! Product catalog client.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{CurrencyCode, Money, ProductId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{CallContext, Operation, Scripts};
use crate::error::ClientError;

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
}

/// Looks up product prices.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn get_product(
        &self,
        ctx: CallContext,
        product_id: &ProductId,
    ) -> Result<Product, ClientError>;
}

/// In-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalogClient {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
    scripts: Scripts,
}

impl InMemoryCatalogClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog preloaded with a handful of USD-priced products.
    pub async fn with_demo_products() -> Result<Self, domain::DomainError> {
        let catalog = Self::new();
        let usd = CurrencyCode::new("USD")?;
        for (id, name, units, nanos) in [
            ("OLJCESPC7Z", "Sunglasses", 19, 990_000_000),
            ("66VCHSJNUP", "Tank Top", 18, 990_000_000),
            ("1YMWWN1N4O", "Watch", 109, 990_000_000),
            ("L9ECAV7KIM", "Loafers", 89, 990_000_000),
            ("2ZYFJ3GM2N", "Hairdryer", 24, 990_000_000),
            ("0PUK6V6EV0", "Candle Holder", 18, 990_000_000),
            ("LS4PSXUNUM", "Salt & Pepper Shakers", 18, 490_000_000),
            ("9SIQT8TOJO", "Bamboo Glass Jar", 5, 490_000_000),
            ("6E92ZMYYFZ", "Mug", 8, 990_000_000),
        ] {
            catalog
                .add_product(id, name, Money::new(usd.clone(), units, nanos)?)
                .await;
        }
        Ok(catalog)
    }

    pub fn scripts(&self) -> &Scripts {
        &self.scripts
    }

    pub async fn add_product(&self, id: impl Into<ProductId>, name: impl Into<String>, price: Money) {
        let id = id.into();
        let product = Product {
            id: id.clone(),
            name: name.into(),
            price,
        };
        self.products.write().await.insert(id, product);
    }
}

#[async_trait]
impl CatalogClient for InMemoryCatalogClient {
    async fn get_product(
        &self,
        ctx: CallContext,
        product_id: &ProductId,
    ) -> Result<Product, ClientError> {
        self.scripts.enter(Operation::GetProduct, &ctx).await?;
        self.products
            .read()
            .await
            .get(product_id)
            .cloned()
            .ok_or_else(|| {
                ClientError::permanent(
                    Operation::GetProduct,
                    format!("no product with id {product_id}"),
                )
            })
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

    #[tokio::test]
    async fn test_demo_catalog_lookup() {
        let catalog = InMemoryCatalogClient::with_demo_products().await.unwrap();
        let product = catalog
            .get_product(ctx(), &ProductId::new("OLJCESPC7Z"))
            .await
            .unwrap();
        assert_eq!(product.name, "Sunglasses");
        assert_eq!(product.price.to_string(), "19.99 USD");
    }

    #[tokio::test]
    async fn test_unknown_product_is_permanent() {
        let catalog = InMemoryCatalogClient::new();
        let err = catalog
            .get_product(ctx(), &ProductId::new("nope"))
            .await
            .unwrap_err();
        assert_eq!(err.class, ErrorClass::Permanent);
    }
}
