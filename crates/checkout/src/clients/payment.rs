//! Payment service client.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{Money, PaymentToken};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{CallContext, Operation, Scripts};
use crate::error::ClientError;

/// A request to capture money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub amount: Money,
    pub token: PaymentToken,

    /// Repeats carrying the same token return the original transaction.
    pub dedupe_token: String,
}

/// Captures payments. Declines are permanent errors.
#[async_trait]
pub trait PaymentClient: Send + Sync {
    /// Returns the transaction id of the capture.
    async fn charge(&self, ctx: CallContext, request: &ChargeRequest)
    -> Result<String, ClientError>;
}

#[derive(Debug, Default)]
struct PaymentState {
    /// dedupe token -> (transaction id, amount)
    transactions: HashMap<String, (String, Money)>,
    declined_tokens: Vec<String>,
    next_id: u32,
}

/// In-memory payment processor.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentClient {
    state: Arc<RwLock<PaymentState>>,
    scripts: Scripts,
}

impl InMemoryPaymentClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripts(&self) -> &Scripts {
        &self.scripts
    }

    /// Declines every charge made with this credential.
    pub async fn decline(&self, token: &PaymentToken) {
        self.state
            .write()
            .await
            .declined_tokens
            .push(token.expose().to_string());
    }

    /// Number of distinct captures.
    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }

    /// The amount captured under a dedupe token.
    pub async fn captured(&self, dedupe_token: &str) -> Option<Money> {
        self.state
            .read()
            .await
            .transactions
            .get(dedupe_token)
            .map(|(_, amount)| amount.clone())
    }
}

#[async_trait]
impl PaymentClient for InMemoryPaymentClient {
    async fn charge(
        &self,
        ctx: CallContext,
        request: &ChargeRequest,
    ) -> Result<String, ClientError> {
        self.scripts.enter(Operation::Charge, &ctx).await?;

        let mut state = self.state.write().await;
        if let Some((transaction_id, _)) = state.transactions.get(&request.dedupe_token) {
            return Ok(transaction_id.clone());
        }
        if state
            .declined_tokens
            .iter()
            .any(|t| t == request.token.expose())
        {
            return Err(ClientError::permanent(Operation::Charge, "card declined"));
        }
        if request.amount.is_negative() || request.amount.is_zero() {
            return Err(ClientError::permanent(
                Operation::Charge,
                format!("invalid charge amount {}", request.amount),
            ));
        }

        state.next_id += 1;
        let transaction_id = format!("TX-{:06}", state.next_id);
        state.transactions.insert(
            request.dedupe_token.clone(),
            (transaction_id.clone(), request.amount.clone()),
        );
        Ok(transaction_id)
    }
}
