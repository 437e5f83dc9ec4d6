//! Shipping execution client.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{Address, CartItem};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{CallContext, Operation, Scripts};
use crate::error::ClientError;

/// A request to dispatch an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipRequest {
    pub address: Address,
    pub items: Vec<CartItem>,

    /// Repeats carrying the same token return the original tracking id.
    pub dedupe_token: String,
}

/// Accepts orders for shipment.
#[async_trait]
pub trait ShippingClient: Send + Sync {
    /// Returns the tracking id once the shipment is accepted.
    async fn ship_order(&self, ctx: CallContext, request: &ShipRequest)
    -> Result<String, ClientError>;
}

#[derive(Debug, Default)]
struct ShippingState {
    /// dedupe token -> tracking id
    shipments: HashMap<String, String>,
    next_id: u32,
}

/// In-memory shipping service.
#[derive(Debug, Clone, Default)]
pub struct InMemoryShippingClient {
    state: Arc<RwLock<ShippingState>>,
    scripts: Scripts,
}

impl InMemoryShippingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripts(&self) -> &Scripts {
        &self.scripts
    }

    /// Number of distinct shipments accepted.
    pub async fn shipment_count(&self) -> usize {
        self.state.read().await.shipments.len()
    }
}

#[async_trait]
impl ShippingClient for InMemoryShippingClient {
    async fn ship_order(
        &self,
        ctx: CallContext,
        request: &ShipRequest,
    ) -> Result<String, ClientError> {
        self.scripts.enter(Operation::ShipOrder, &ctx).await?;

        if request.items.is_empty() {
            return Err(ClientError::permanent(
                Operation::ShipOrder,
                "nothing to ship",
            ));
        }

        let mut state = self.state.write().await;
        if let Some(tracking_id) = state.shipments.get(&request.dedupe_token) {
            return Ok(tracking_id.clone());
        }
        state.next_id += 1;
        let tracking_id = format!("TRK-{:06}", state.next_id);
        state
            .shipments
            .insert(request.dedupe_token.clone(), tracking_id.clone());
        Ok(tracking_id)
    }
}
