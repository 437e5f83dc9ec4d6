//! Saga instance.

use std::collections::BTreeMap;

use common::{OrderId, SagaId, TraceId};
use domain::{CartSnapshot, CheckoutRequest, OrderResultEvent, PricedLine, PricedOrder, SubFailure};

use crate::clients::Operation;
use crate::error::SagaError;
use crate::events::SagaEvent;
use crate::outcome::CheckoutOutcome;
use crate::state::SagaState;

/// One execution of the checkout saga.
///
/// Owned by the task running the request. State only changes through
/// [`SagaInstance::record`], which checks the transition graph and appends the
/// event to the journal.
#[derive(Debug, Clone)]
pub struct SagaInstance {
    id: SagaId,
    order_id: OrderId,
    request: CheckoutRequest,
    trace_id: TraceId,
    state: SagaState,
    cart: Option<CartSnapshot>,
    priced_lines: Vec<PricedLine>,
    priced_order: Option<PricedOrder>,
    /// Payment transaction ID, set once charged.
    transaction_id: Option<String>,
    /// Shipping tracking ID, set once shipped.
    tracking_id: Option<String>,
    retries: BTreeMap<Operation, u32>,
    sub_failures: Vec<SubFailure>,
    failure_reason: Option<String>,
    /// Dedupe token of a charge that timed out.
    payment_dedupe_token: Option<String>,
    journal: Vec<SagaEvent>,
}

impl SagaInstance {
    /// Creates an instance for an accepted request and records `SagaStarted`.
    pub fn start(order_id: OrderId, request: CheckoutRequest, trace_id: TraceId) -> Self {
        let id = SagaId::new();
        let mut saga = Self {
            id,
            order_id,
            request,
            trace_id,
            state: SagaState::Initiated,
            cart: None,
            priced_lines: Vec::new(),
            priced_order: None,
            transaction_id: None,
            tracking_id: None,
            retries: BTreeMap::new(),
            sub_failures: Vec::new(),
            failure_reason: None,
            payment_dedupe_token: None,
            journal: Vec::new(),
        };
        let started = SagaEvent::saga_started(id, order_id, trace_id);
        saga.apply(&started);
        saga.journal.push(started);
        saga
    }

    /// Moves to `to` if the transition graph allows it.
    pub fn advance(&mut self, to: SagaState) -> Result<(), SagaError> {
        if !self.state.can_transition_to(to) {
            return Err(SagaError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Validates and applies an event, then appends it to the journal.
    pub fn record(&mut self, event: SagaEvent) -> Result<(), SagaError> {
        if let SagaEvent::SagaStarted(_) = event {
            return Err(SagaError::InvalidTransition {
                from: self.state,
                to: SagaState::Initiated,
            });
        }
        if let Some(to) = event.target_state() {
            self.advance(to)?;
        } else if self.state.is_terminal() {
            return Err(SagaError::InvalidTransition {
                from: self.state,
                to: self.state,
            });
        }
        self.apply(&event);
        self.journal.push(event);
        Ok(())
    }

    /// Records the extra attempts a step needed. No-op for zero.
    pub fn record_retries(&mut self, operation: Operation, retries: u32) -> Result<(), SagaError> {
        if retries == 0 {
            return Ok(());
        }
        self.record(SagaEvent::step_retried(operation, retries))
    }

    fn apply(&mut self, event: &SagaEvent) {
        match event {
            SagaEvent::SagaStarted(_) | SagaEvent::CartEmptied | SagaEvent::SagaCompleted(_) => {}
            SagaEvent::CartFetched(data) => {
                self.cart = Some(data.cart.clone());
            }
            SagaEvent::OrderPriced(data) => {
                self.priced_lines = data.lines.clone();
            }
            SagaEvent::ShippingQuoted(data) => {
                self.priced_order = Some(data.priced_order.clone());
            }
            SagaEvent::PaymentCharged(data) => {
                self.transaction_id = Some(data.transaction_id.clone());
            }
            SagaEvent::OrderShipped(data) => {
                self.tracking_id = Some(data.tracking_id.clone());
            }
            SagaEvent::StepRetried(data) => {
                *self.retries.entry(data.operation).or_default() += data.retries;
            }
            SagaEvent::StepFailed(data) => {
                self.sub_failures
                    .push(SubFailure::new(data.operation.as_str(), data.error.clone()));
            }
            SagaEvent::SagaFailed(data) => {
                self.failure_reason = Some(data.reason.clone());
                self.payment_dedupe_token = data.payment_dedupe_token.clone();
            }
        }
    }

    /// Builds the order event for a terminal saga.
    pub fn to_event(&self) -> Result<OrderResultEvent, SagaError> {
        let event = match self.state {
            SagaState::Completed => OrderResultEvent::completed(
                self.order_id,
                self.priced_order
                    .clone()
                    .ok_or(SagaError::Missing("priced order"))?,
                self.transaction_id
                    .clone()
                    .ok_or(SagaError::Missing("transaction id"))?,
                self.tracking_id.clone(),
                self.sub_failures.clone(),
                self.trace_id,
            ),
            SagaState::Failed => {
                let event = OrderResultEvent::failed(
                    self.order_id,
                    self.priced_order.clone(),
                    self.failure_reason
                        .clone()
                        .ok_or(SagaError::Missing("failure reason"))?,
                    self.trace_id,
                );
                match &self.payment_dedupe_token {
                    Some(token) => event.with_payment_dedupe_token(token.clone()),
                    None => event,
                }
            }
            other => return Err(SagaError::NotTerminal(other)),
        };
        Ok(event)
    }

    /// Summarizes the saga for the caller.
    ///
    /// Anything charged counts as completed, even if bookkeeping stopped short
    /// of the `Completed` state.
    pub fn outcome(&self, event_published: bool) -> CheckoutOutcome {
        let outcome = if self.state.is_charged() {
            domain::OrderOutcome::Completed
        } else {
            domain::OrderOutcome::Failed
        };
        CheckoutOutcome {
            order_id: self.order_id,
            outcome,
            priced_order: self.priced_order.clone(),
            failure_reason: self.failure_reason.clone(),
            sub_failures: self.sub_failures.clone(),
            transaction_id: self.transaction_id.clone(),
            tracking_id: self.tracking_id.clone(),
            payment_dedupe_token: self.payment_dedupe_token.clone(),
            trace_id: self.trace_id,
            event_published,
        }
    }
}

// Query methods
impl SagaInstance {
    pub fn id(&self) -> SagaId {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn request(&self) -> &CheckoutRequest {
        &self.request
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn cart(&self) -> Option<&CartSnapshot> {
        self.cart.as_ref()
    }

    /// Lines priced so far, without shipping.
    pub fn priced_lines(&self) -> &[PricedLine] {
        &self.priced_lines
    }

    pub fn priced_order(&self) -> Option<&PricedOrder> {
        self.priced_order.as_ref()
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn tracking_id(&self) -> Option<&str> {
        self.tracking_id.as_deref()
    }

    pub fn payment_dedupe_token(&self) -> Option<&str> {
        self.payment_dedupe_token.as_deref()
    }

    /// Retries spent on an operation across the whole saga.
    pub fn retries(&self, operation: Operation) -> u32 {
        self.retries.get(&operation).copied().unwrap_or(0)
    }

    pub fn sub_failures(&self) -> &[SubFailure] {
        &self.sub_failures
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Every event recorded so far, oldest first.
    pub fn journal(&self) -> &[SagaEvent] {
        &self.journal
    }
}
