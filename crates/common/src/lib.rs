//! Identifier types shared across the checkout workspace.

pub mod types;

pub use types::{OrderId, SagaId, SpanId, TraceId};
