//! Saga journal events.

use chrono::{DateTime, Utc};
use common::{OrderId, SagaId, TraceId};
use domain::{CartSnapshot, DomainEvent, PricedLine, PricedOrder};
use serde::{Deserialize, Serialize};

use crate::clients::Operation;
use crate::state::SagaState;

/// Facts recorded by a saga instance as it executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// Saga execution started.
    SagaStarted(SagaStartedData),

    /// The cart was read.
    CartFetched(CartFetchedData),

    /// Every line has a unit price in the target currency.
    OrderPriced(OrderPricedData),

    /// Shipping was quoted and the order total is known.
    ShippingQuoted(ShippingQuotedData),

    /// Payment was captured.
    PaymentCharged(PaymentChargedData),

    /// Shipping accepted the order.
    OrderShipped(OrderShippedData),

    /// The cart was cleared.
    CartEmptied,

    /// A step needed more than one attempt.
    StepRetried(StepRetriedData),

    /// A post-payment step failed and was skipped.
    StepFailed(StepFailedData),

    /// Saga completed, possibly with sub-failures.
    SagaCompleted(SagaCompletedData),

    /// Saga aborted before payment.
    SagaFailed(SagaFailedData),
}

impl DomainEvent for SagaEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::SagaStarted(_) => "SagaStarted",
            SagaEvent::CartFetched(_) => "CartFetched",
            SagaEvent::OrderPriced(_) => "OrderPriced",
            SagaEvent::ShippingQuoted(_) => "ShippingQuoted",
            SagaEvent::PaymentCharged(_) => "PaymentCharged",
            SagaEvent::OrderShipped(_) => "OrderShipped",
            SagaEvent::CartEmptied => "CartEmptied",
            SagaEvent::StepRetried(_) => "StepRetried",
            SagaEvent::StepFailed(_) => "StepFailed",
            SagaEvent::SagaCompleted(_) => "SagaCompleted",
            SagaEvent::SagaFailed(_) => "SagaFailed",
        }
    }
}

impl SagaEvent {
    /// The state this event moves the saga into, if it moves it at all.
    pub fn target_state(&self) -> Option<SagaState> {
        match self {
            SagaEvent::SagaStarted(_) | SagaEvent::StepRetried(_) | SagaEvent::StepFailed(_) => {
                None
            }
            SagaEvent::CartFetched(_) => Some(SagaState::CartFetched),
            SagaEvent::OrderPriced(_) => Some(SagaState::Priced),
            SagaEvent::ShippingQuoted(_) => Some(SagaState::ShippingQuoted),
            SagaEvent::PaymentCharged(_) => Some(SagaState::Charged),
            SagaEvent::OrderShipped(_) => Some(SagaState::Shipped),
            SagaEvent::CartEmptied => Some(SagaState::CartEmptied),
            SagaEvent::SagaCompleted(_) => Some(SagaState::Completed),
            SagaEvent::SagaFailed(_) => Some(SagaState::Failed),
        }
    }
}

/// Data for SagaStarted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaStartedData {
    pub saga_id: SagaId,
    pub order_id: OrderId,
    pub trace_id: TraceId,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartFetchedData {
    pub cart: CartSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPricedData {
    pub lines: Vec<PricedLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingQuotedData {
    /// The complete order including the converted shipping cost.
    pub priced_order: PricedOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentChargedData {
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShippedData {
    pub tracking_id: String,
}

/// Data for StepRetried event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRetriedData {
    pub operation: Operation,
    /// Attempts beyond the first.
    pub retries: u32,
}

/// Data for StepFailed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailedData {
    pub operation: Operation,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaCompletedData {
    pub completed_at: DateTime<Utc>,
}

/// Data for SagaFailed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaFailedData {
    /// Reason for failure.
    pub reason: String,
    /// The operation whose failure aborted the saga, if any.
    pub operation: Option<Operation>,
    /// Set when the charge timed out and may have been captured anyway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_dedupe_token: Option<String>,
    pub failed_at: DateTime<Utc>,
}

// Convenience constructors
impl SagaEvent {
    pub fn saga_started(saga_id: SagaId, order_id: OrderId, trace_id: TraceId) -> Self {
        SagaEvent::SagaStarted(SagaStartedData {
            saga_id,
            order_id,
            trace_id,
            started_at: Utc::now(),
        })
    }

    pub fn cart_fetched(cart: CartSnapshot) -> Self {
        SagaEvent::CartFetched(CartFetchedData { cart })
    }

    pub fn order_priced(lines: Vec<PricedLine>) -> Self {
        SagaEvent::OrderPriced(OrderPricedData { lines })
    }

    pub fn shipping_quoted(priced_order: PricedOrder) -> Self {
        SagaEvent::ShippingQuoted(ShippingQuotedData { priced_order })
    }

    pub fn payment_charged(transaction_id: impl Into<String>) -> Self {
        SagaEvent::PaymentCharged(PaymentChargedData {
            transaction_id: transaction_id.into(),
        })
    }

    pub fn order_shipped(tracking_id: impl Into<String>) -> Self {
        SagaEvent::OrderShipped(OrderShippedData {
            tracking_id: tracking_id.into(),
        })
    }

    pub fn step_retried(operation: Operation, retries: u32) -> Self {
        SagaEvent::StepRetried(StepRetriedData { operation, retries })
    }

    pub fn step_failed(operation: Operation, error: impl Into<String>) -> Self {
        SagaEvent::StepFailed(StepFailedData {
            operation,
            error: error.into(),
        })
    }

    pub fn saga_completed() -> Self {
        SagaEvent::SagaCompleted(SagaCompletedData {
            completed_at: Utc::now(),
        })
    }

    pub fn saga_failed(reason: impl Into<String>, operation: Option<Operation>) -> Self {
        SagaEvent::SagaFailed(SagaFailedData {
            reason: reason.into(),
            operation,
            payment_dedupe_token: None,
            failed_at: Utc::now(),
        })
    }

    /// Failure after a charge attempt whose result is unknown.
    pub fn charge_unconfirmed(reason: impl Into<String>, dedupe_token: impl Into<String>) -> Self {
        SagaEvent::SagaFailed(SagaFailedData {
            reason: reason.into(),
            operation: Some(Operation::Charge),
            payment_dedupe_token: Some(dedupe_token.into()),
            failed_at: Utc::now(),
        })
    }
}
