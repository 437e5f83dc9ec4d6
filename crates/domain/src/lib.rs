//! Domain layer for the checkout orchestrator.
//!
//! This crate provides the value types a checkout saga works with:
//! - Money with per-currency arithmetic
//! - The immutable checkout request and its validation
//! - Cart snapshots and priced orders
//! - The order result event published at the end of every saga

pub mod checkout;
pub mod error;
pub mod event;

pub use checkout::{
    Address, CartItem, CartSnapshot, CheckoutRequest, CurrencyCode, EmailAddress, IdempotencyKey,
    Money, OrderOutcome, OrderResultEvent, PaymentToken, PricedLine, PricedOrder, ProductId,
    SubFailure, UserId,
};
pub use error::DomainError;
pub use event::DomainEvent;
