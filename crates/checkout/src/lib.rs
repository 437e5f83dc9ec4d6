//! Checkout saga orchestration.
//!
//! This crate sequences a checkout across the dependency services:
//! - Cart, catalog, currency, shipping quote, payment, shipping and email clients
//! - Bounded retry for transient failures, never for the charge
//! - A hot-swappable fault-injection policy consulted before every call
//! - W3C trace context threaded through every call and the published event
//! - Idempotency keys that collapse re-submissions onto one saga
//!
//! Every accepted checkout publishes exactly one order event to the log.

pub mod cancel;
pub mod clients;
pub mod error;
pub mod events;
pub mod fault;
pub mod idempotency;
pub mod instance;
pub mod orchestrator;
pub mod outcome;
pub mod propagation;
pub mod publisher;
pub mod retry;
pub mod state;

pub use cancel::{CancelGuard, CancelSignal, cancellation};
pub use clients::{CallContext, Invoker, Operation};
pub use error::{CheckoutError, ClientError, ErrorClass, PublishError, SagaError};
pub use events::SagaEvent;
pub use fault::{FaultAction, FaultDecision, FaultPolicy, FaultPolicyProvider, FaultPolicyWatcher, FaultRule};
pub use idempotency::IdempotencyRegistry;
pub use instance::SagaInstance;
pub use orchestrator::{CheckoutOrchestrator, Dependencies, OrchestratorConfig};
pub use outcome::CheckoutOutcome;
pub use propagation::{Extractor, Injector, TraceContext};
pub use publisher::{EventPublisher, LogEventPublisher, ORDERS_TOPIC};
pub use retry::RetryPolicy;
pub use state::SagaState;
