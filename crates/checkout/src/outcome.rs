//! The terminal result returned to a checkout caller.

use common::{OrderId, TraceId};
use domain::{OrderOutcome, PricedOrder, SubFailure};
use serde::{Deserialize, Serialize};

/// Terminal outcome of one checkout.
///
/// Every submission sharing an idempotency key receives the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutOutcome {
    pub order_id: OrderId,
    pub outcome: OrderOutcome,
    pub priced_order: Option<PricedOrder>,
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub sub_failures: Vec<SubFailure>,
    pub transaction_id: Option<String>,
    pub tracking_id: Option<String>,
    /// Set on a failure whose charge timed out; see
    /// [`domain::OrderResultEvent::payment_dedupe_token`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_dedupe_token: Option<String>,
    pub trace_id: TraceId,

    /// False when the order event could not be written to the log.
    pub event_published: bool,
}

impl CheckoutOutcome {
    pub fn is_completed(&self) -> bool {
        self.outcome == OrderOutcome::Completed
    }

    /// Completed with at least one post-payment sub-failure.
    pub fn is_degraded(&self) -> bool {
        self.is_completed() && !self.sub_failures.is_empty()
    }
}
