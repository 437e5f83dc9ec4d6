//! Cart service client.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{CartItem, ProductId, UserId};
use tokio::sync::RwLock;

use super::{CallContext, Operation, Scripts};
use crate::error::ClientError;

/// Reads and clears a shopper's cart.
#[async_trait]
pub trait CartClient: Send + Sync {
    /// Returns the cart lines in the order the cart stores them.
    async fn get_cart(&self, ctx: CallContext, user_id: &UserId)
    -> Result<Vec<CartItem>, ClientError>;

    async fn empty_cart(&self, ctx: CallContext, user_id: &UserId) -> Result<(), ClientError>;
}

/// Shopper whose cart [`InMemoryCartClient::with_demo_cart`] fills.
pub const DEMO_USER: &str = "demo-user";

/// In-memory cart store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartClient {
    carts: Arc<RwLock<HashMap<UserId, Vec<CartItem>>>>,
    scripts: Scripts,
}

impl InMemoryCartClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding one cart for [`DEMO_USER`], made of products from the
    /// demo catalog. Checking out empties it like any other cart.
    pub async fn with_demo_cart() -> Self {
        let cart = Self::new();
        let user = UserId::new(DEMO_USER);
        cart.add_item(&user, "OLJCESPC7Z", 1).await;
        cart.add_item(&user, "6E92ZMYYFZ", 2).await;
        cart.add_item(&user, "9SIQT8TOJO", 1).await;
        cart
    }

    pub fn scripts(&self) -> &Scripts {
        &self.scripts
    }

    /// Adds a line, merging with an existing line for the same product.
    pub async fn add_item(&self, user_id: &UserId, product_id: impl Into<ProductId>, quantity: u32) {
        let product_id = product_id.into();
        let mut carts = self.carts.write().await;
        let cart = carts.entry(user_id.clone()).or_default();
        match cart.iter_mut().find(|item| item.product_id == product_id) {
            Some(item) => item.quantity += quantity,
            None => cart.push(CartItem::new(product_id, quantity)),
        }
    }

    pub async fn items(&self, user_id: &UserId) -> Vec<CartItem> {
        self.carts
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl CartClient for InMemoryCartClient {
    async fn get_cart(
        &self,
        ctx: CallContext,
        user_id: &UserId,
    ) -> Result<Vec<CartItem>, ClientError> {
        self.scripts.enter(Operation::GetCart, &ctx).await?;
        Ok(self.items(user_id).await)
    }

    async fn empty_cart(&self, ctx: CallContext, user_id: &UserId) -> Result<(), ClientError> {
        self.scripts.enter(Operation::EmptyCart, &ctx).await?;
        self.carts.write().await.remove(user_id);
        Ok(())
    }
}
