//! Dependency clients.
//!
//! Each remote capability the checkout needs is a trait with an in-memory
//! implementation (tests, demo binary) and a JSON-over-HTTP implementation.
//! Every method takes a [`CallContext`] carrying the trace context and the
//! caller's hard deadline.
//!
//! Calls are made through an [`Invoker`], which consults the fault policy,
//! enforces the deadline and records call metrics.

pub mod cart;
pub mod catalog;
pub mod currency;
pub mod email;
pub mod http;
pub mod payment;
pub mod quote;
mod script;
pub mod shipping;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::ClientError;
use crate::fault::{FaultContext, FaultDecision, FaultPolicyProvider};
use crate::propagation::TraceContext;

pub use cart::{CartClient, DEMO_USER, InMemoryCartClient};
pub use catalog::{CatalogClient, InMemoryCatalogClient, Product};
pub use currency::{CurrencyClient, InMemoryCurrencyClient};
pub use email::{EmailClient, InMemoryEmailClient, OrderConfirmation};
pub use http::HttpDependencyClient;
pub use payment::{ChargeRequest, InMemoryPaymentClient, PaymentClient};
pub use quote::{InMemoryQuoteClient, QuoteClient};
pub use script::{ScriptedFailure, Scripts};
pub use shipping::{InMemoryShippingClient, ShipRequest, ShippingClient};

/// Every remote operation the orchestrator performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = "getCart")]
    GetCart,
    #[serde(rename = "emptyCart")]
    EmptyCart,
    #[serde(rename = "getProduct")]
    GetProduct,
    #[serde(rename = "convert")]
    Convert,
    #[serde(rename = "quote")]
    Quote,
    #[serde(rename = "charge")]
    Charge,
    #[serde(rename = "shipOrder")]
    ShipOrder,
    #[serde(rename = "sendOrderConfirmation")]
    SendOrderConfirmation,
}

/// Wire-level side-effect class of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Idempotency {
    /// Read-only or naturally idempotent. Retried freely.
    Idempotent,

    /// Has a side effect. Only repeatable with a dedupe token the callee honours.
    NonIdempotent,

    /// Single best-effort attempt; the outcome never gates the saga.
    FireAndForget,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::GetCart,
        Operation::EmptyCart,
        Operation::GetProduct,
        Operation::Convert,
        Operation::Quote,
        Operation::Charge,
        Operation::ShipOrder,
        Operation::SendOrderConfirmation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetCart => "getCart",
            Operation::EmptyCart => "emptyCart",
            Operation::GetProduct => "getProduct",
            Operation::Convert => "convert",
            Operation::Quote => "quote",
            Operation::Charge => "charge",
            Operation::ShipOrder => "shipOrder",
            Operation::SendOrderConfirmation => "sendOrderConfirmation",
        }
    }

    pub fn idempotency(&self) -> Idempotency {
        match self {
            Operation::GetCart
            | Operation::EmptyCart
            | Operation::GetProduct
            | Operation::Convert
            | Operation::Quote => Idempotency::Idempotent,
            Operation::Charge | Operation::ShipOrder => Idempotency::NonIdempotent,
            Operation::SendOrderConfirmation => Idempotency::FireAndForget,
        }
    }

    /// Whether a transient failure may be retried.
    ///
    /// Shipping carries the order id as dedupe token and may be repeated.
    /// A charge is attempted exactly once.
    pub fn is_retryable(&self) -> bool {
        match self.idempotency() {
            Idempotency::Idempotent => true,
            Idempotency::NonIdempotent => *self == Operation::ShipOrder,
            Idempotency::FireAndForget => false,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unknown operation: {s}"))
    }
}

/// Per-call context passed to every client method.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub trace: TraceContext,

    /// Hard upper bound for the call. Callees never extend it.
    pub deadline: Instant,

    /// The shopper on whose behalf the call is made, for fault matching.
    pub user_id: Option<String>,
}

impl CallContext {
    pub fn new(trace: TraceContext, deadline: Instant) -> Self {
        Self {
            trace,
            deadline,
            user_id: None,
        }
    }

    /// A context whose deadline is `timeout` from now.
    pub fn with_timeout(trace: TraceContext, timeout: Duration) -> Self {
        Self::new(trace, Instant::now() + timeout)
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn child(&self) -> Self {
        Self {
            trace: self.trace.child(),
            deadline: self.deadline,
            user_id: self.user_id.clone(),
        }
    }
}

/// Runs dependency calls under the fault policy and the caller's deadline.
#[derive(Debug, Clone, Default)]
pub struct Invoker {
    faults: Arc<FaultPolicyProvider>,
}

impl Invoker {
    pub fn new(faults: Arc<FaultPolicyProvider>) -> Self {
        Self { faults }
    }

    pub fn faults(&self) -> &Arc<FaultPolicyProvider> {
        &self.faults
    }

    /// Performs one attempt of `operation`.
    ///
    /// The fault decision is taken fresh on every attempt. Injected latency and
    /// the real call both count against `ctx.deadline`; running out of time
    /// yields a transient timeout error.
    pub async fn invoke<T, F, Fut>(
        &self,
        operation: Operation,
        ctx: &CallContext,
        call: F,
    ) -> Result<T, ClientError>
    where
        F: FnOnce(CallContext) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let started = std::time::Instant::now();
        let child = ctx.child();

        let decision = self.faults.decide(
            operation,
            &FaultContext {
                baggage: ctx.trace.baggage(),
                user_id: ctx.user_id.as_deref(),
            },
        );
        if !decision.is_pass() {
            metrics::counter!(
                "fault_injections_total",
                "operation" => operation.as_str(),
                "kind" => decision.kind()
            )
            .increment(1);
            tracing::debug!(%operation, kind = decision.kind(), "fault injected");
        }

        let result = match decision {
            FaultDecision::InjectError { class, message } => {
                Err(ClientError::injected(operation, class, message))
            }
            FaultDecision::InjectLatency(delay) => {
                match tokio::time::timeout_at(ctx.deadline, tokio::time::sleep(delay)).await {
                    Ok(()) => Self::bounded(operation, ctx.deadline, call(child)).await,
                    Err(_) => Err(ClientError::timeout(operation)),
                }
            }
            FaultDecision::Pass => Self::bounded(operation, ctx.deadline, call(child)).await,
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) if e.timed_out => "timeout",
            Err(e) if e.is_retryable() => "transient",
            Err(_) => "permanent",
        };
        metrics::histogram!(
            "dependency_call_duration_seconds",
            "operation" => operation.as_str(),
            "outcome" => outcome
        )
        .record(started.elapsed().as_secs_f64());

        result
    }

    async fn bounded<T>(
        operation: Operation,
        deadline: Instant,
        call: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        tokio::time::timeout_at(deadline, call)
            .await
            .unwrap_or_else(|_| Err(ClientError::timeout(operation)))
    }
}
