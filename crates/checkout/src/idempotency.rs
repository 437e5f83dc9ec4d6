//! Idempotency-key registry.
//!
//! Admits the first submission of a key and routes every later submission to
//! the outcome of that first saga, waiting for it while it is still running.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use common::OrderId;
use domain::{CheckoutRequest, IdempotencyKey};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::CheckoutError;
use crate::outcome::CheckoutOutcome;

type OutcomeSlot = Option<Arc<CheckoutOutcome>>;

#[derive(Debug)]
struct Entry {
    fingerprint: String,
    order_id: OrderId,
    outcome: watch::Receiver<OutcomeSlot>,
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: HashMap<IdempotencyKey, Entry>,
    /// Keys with a terminal outcome, oldest first.
    finished: VecDeque<IdempotencyKey>,
}

/// Tracks every idempotency key seen by this process.
///
/// Keys with a running saga are always retained. At most `capacity` finished
/// outcomes are kept; older ones are evicted first.
#[derive(Debug, Clone)]
pub struct IdempotencyRegistry {
    state: Arc<Mutex<RegistryState>>,
    capacity: usize,
}

/// Result of presenting a request to the registry.
#[derive(Debug)]
pub enum Admission {
    /// First sighting of the key. The holder must run the saga.
    New(Ticket),

    /// The key belongs to an earlier submission.
    Existing(Pending),
}

impl IdempotencyRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::default(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits `request` or routes it to the saga already registered under its key.
    ///
    /// Fails with `IdempotencyConflict` when the key was used for a request
    /// with a different fingerprint.
    pub fn begin(&self, request: &CheckoutRequest) -> Result<Admission, CheckoutError> {
        let key = &request.idempotency_key;
        let fingerprint = request.fingerprint();
        let mut state = self.lock();

        if let Some(entry) = state.entries.get(key) {
            if entry.fingerprint != fingerprint {
                return Err(CheckoutError::IdempotencyConflict(key.clone()));
            }
            return Ok(Admission::Existing(Pending {
                key: key.clone(),
                order_id: entry.order_id,
                outcome: entry.outcome.clone(),
            }));
        }

        let order_id = OrderId::new();
        let (sender, receiver) = watch::channel(None);
        state.entries.insert(
            key.clone(),
            Entry {
                fingerprint,
                order_id,
                outcome: receiver,
            },
        );
        Ok(Admission::New(Ticket {
            key: key.clone(),
            order_id,
            sender,
            registry: self.clone(),
            completed: false,
        }))
    }

    /// The stored outcome for a key, if its saga has finished.
    pub fn outcome(&self, key: &IdempotencyKey) -> Option<Arc<CheckoutOutcome>> {
        self.lock()
            .entries
            .get(key)
            .and_then(|entry| entry.outcome.borrow().clone())
    }

    /// Number of keys currently tracked, running or finished.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn finish(&self, key: &IdempotencyKey) {
        let mut state = self.lock();
        state.finished.push_back(key.clone());
        while state.finished.len() > self.capacity {
            if let Some(evicted) = state.finished.pop_front() {
                state.entries.remove(&evicted);
                tracing::debug!(idempotency_key = %evicted, "evicted finished checkout");
            }
        }
    }

    fn abandon(&self, key: &IdempotencyKey) {
        self.lock().entries.remove(key);
    }
}

impl Default for IdempotencyRegistry {
    fn default() -> Self {
        Self::new(10_000)
    }
}

/// Exclusive right to run the saga for a key.
///
/// Dropping it without calling [`Ticket::complete`] releases the key so a later
/// submission can start over; anyone waiting on it gets an error.
#[derive(Debug)]
pub struct Ticket {
    key: IdempotencyKey,
    order_id: OrderId,
    sender: watch::Sender<OutcomeSlot>,
    registry: IdempotencyRegistry,
    completed: bool,
}

impl Ticket {
    pub fn key(&self) -> &IdempotencyKey {
        &self.key
    }

    /// The order ID assigned to this key.
    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Stores the terminal outcome and wakes every waiter.
    pub fn complete(mut self, outcome: Arc<CheckoutOutcome>) {
        self.sender.send_replace(Some(outcome));
        self.completed = true;
        self.registry.finish(&self.key);
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if !self.completed {
            tracing::warn!(idempotency_key = %self.key, "checkout abandoned without an outcome");
            self.registry.abandon(&self.key);
        }
    }
}

/// A duplicate submission waiting on the original saga.
#[derive(Debug)]
pub struct Pending {
    key: IdempotencyKey,
    order_id: OrderId,
    outcome: watch::Receiver<OutcomeSlot>,
}

impl Pending {
    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Waits until the original saga finishes or `deadline` passes.
    pub async fn wait(mut self, deadline: Instant) -> Result<Arc<CheckoutOutcome>, CheckoutError> {
        match tokio::time::timeout_at(deadline, self.outcome.wait_for(Option::is_some)).await {
            Ok(Ok(slot)) => slot
                .clone()
                .ok_or_else(|| CheckoutError::Internal("outcome vanished".to_string())),
            Ok(Err(_)) => Err(CheckoutError::Internal(format!(
                "checkout for key {} was abandoned",
                self.key
            ))),
            Err(_) => Err(CheckoutError::InFlightTimeout(self.key)),
        }
    }
}
