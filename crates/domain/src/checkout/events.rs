//! The terminal order event.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{OrderId, TraceId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::PricedOrder;
use crate::event::DomainEvent;

/// Final business outcome of a checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderOutcome {
    /// The payment was captured. Post-payment steps may still have sub-failures.
    Completed,

    /// The saga aborted before any money moved.
    Failed,
}

impl std::fmt::Display for OrderOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderOutcome::Completed => write!(f, "completed"),
            OrderOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// A non-fatal failure of a post-payment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubFailure {
    /// Operation that failed (e.g. "shipOrder").
    pub operation: String,

    /// Human-readable cause.
    pub reason: String,
}

impl SubFailure {
    pub fn new(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// Event published once per checkout when the saga reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResultEvent {
    /// Unique ID of this event.
    pub event_id: Uuid,

    /// The order this event concludes.
    pub order_id: OrderId,

    pub outcome: OrderOutcome,

    /// Priced order, if pricing completed before the saga ended.
    pub priced_order: Option<PricedOrder>,

    /// Why the order failed. Always set when `outcome` is `Failed`.
    pub failure_reason: Option<String>,

    /// Post-payment steps that did not succeed.
    #[serde(default)]
    pub sub_failures: Vec<SubFailure>,

    pub transaction_id: Option<String>,

    pub tracking_id: Option<String>,

    /// Dedupe token of a charge whose result never arrived. The payment
    /// service may still have captured under it, so reconciliation looks
    /// the charge up by this token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_dedupe_token: Option<String>,

    /// Causal identifier shared with every dependency call of the request.
    pub trace_id: TraceId,

    /// Baggage propagated from the inbound request.
    #[serde(default)]
    pub baggage: BTreeMap<String, String>,

    pub occurred_at: DateTime<Utc>,
}

impl OrderResultEvent {
    /// Creates the event for a charged order.
    pub fn completed(
        order_id: OrderId,
        priced_order: PricedOrder,
        transaction_id: String,
        tracking_id: Option<String>,
        sub_failures: Vec<SubFailure>,
        trace_id: TraceId,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            order_id,
            outcome: OrderOutcome::Completed,
            priced_order: Some(priced_order),
            failure_reason: None,
            sub_failures,
            transaction_id: Some(transaction_id),
            tracking_id,
            payment_dedupe_token: None,
            trace_id,
            baggage: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    /// Creates the event for an order aborted before payment.
    pub fn failed(
        order_id: OrderId,
        priced_order: Option<PricedOrder>,
        failure_reason: impl Into<String>,
        trace_id: TraceId,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            order_id,
            outcome: OrderOutcome::Failed,
            priced_order,
            failure_reason: Some(failure_reason.into()),
            sub_failures: Vec::new(),
            transaction_id: None,
            tracking_id: None,
            payment_dedupe_token: None,
            trace_id,
            baggage: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    /// Attaches propagated baggage.
    pub fn with_baggage(mut self, baggage: BTreeMap<String, String>) -> Self {
        self.baggage = baggage;
        self
    }

    /// Marks a failed order whose charge timed out under `token`.
    pub fn with_payment_dedupe_token(mut self, token: impl Into<String>) -> Self {
        self.payment_dedupe_token = Some(token.into());
        self
    }

    /// True for a completed order with at least one sub-failure.
    pub fn is_degraded(&self) -> bool {
        self.outcome == OrderOutcome::Completed && !self.sub_failures.is_empty()
    }
}

impl DomainEvent for OrderResultEvent {
    fn event_type(&self) -> &'static str {
        match self.outcome {
            OrderOutcome::Completed => "OrderCompleted",
            OrderOutcome::Failed => "OrderFailed",
        }
    }
}
