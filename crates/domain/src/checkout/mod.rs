//! Checkout value types.

mod events;
mod money;
mod order;
mod request;
mod value_objects;

pub use events::{OrderOutcome, OrderResultEvent, SubFailure};
pub use money::{CurrencyCode, Money};
pub use order::{CartItem, CartSnapshot, PricedLine, PricedOrder};
pub use request::CheckoutRequest;
pub use value_objects::{Address, EmailAddress, IdempotencyKey, PaymentToken, ProductId, UserId};
