//! HTTP route handlers.

pub mod checkout;
pub mod fault_policy;
pub mod health;
pub mod metrics;
