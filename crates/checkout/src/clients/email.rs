//! Email notification client.

use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::{Address, EmailAddress, PricedOrder};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{CallContext, Operation, Scripts};
use crate::error::ClientError;

/// Content of an order confirmation mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub order_id: OrderId,
    pub priced_order: PricedOrder,
    pub shipping_address: Address,
}

/// Sends transactional mail.
#[async_trait]
pub trait EmailClient: Send + Sync {
    async fn send_order_confirmation(
        &self,
        ctx: CallContext,
        email: &EmailAddress,
        order: &OrderConfirmation,
    ) -> Result<(), ClientError>;
}

/// In-memory outbox.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEmailClient {
    sent: Arc<RwLock<Vec<(EmailAddress, OrderConfirmation)>>>,
    scripts: Scripts,
}

impl InMemoryEmailClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripts(&self) -> &Scripts {
        &self.scripts
    }

    pub async fn sent(&self) -> Vec<(EmailAddress, OrderConfirmation)> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl EmailClient for InMemoryEmailClient {
    async fn send_order_confirmation(
        &self,
        ctx: CallContext,
        email: &EmailAddress,
        order: &OrderConfirmation,
    ) -> Result<(), ClientError> {
        self.scripts.enter(Operation::SendOrderConfirmation, &ctx).await?;
        self.sent.write().await.push((email.clone(), order.clone()));
        Ok(())
    }
}
