//! Checkout saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a checkout saga.
///
/// State transitions:
/// ```text
/// Initiated ─► CartFetched ─► Priced ─► ShippingQuoted ─► Charged ─► Shipped ─► CartEmptied ─► Completed
///     │             │           │             │              │          │                      ▲
///     └─────────────┴───────────┴─────────────┴─► Failed     └──────────┴── (skip failed step) ┘
/// ```
///
/// `Failed` is only reachable before the charge. From `Charged` on, a failed
/// step is skipped and the saga still completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum SagaState {
    #[default]
    Initiated,
    CartFetched,
    Priced,
    ShippingQuoted,
    Charged,
    Shipped,
    CartEmptied,
    Completed,
    Failed,
}

impl SagaState {
    /// Returns true if `next` is an edge of the transition graph from this state.
    pub fn can_transition_to(&self, next: SagaState) -> bool {
        use SagaState::*;
        match (self, next) {
            (Initiated, CartFetched)
            | (CartFetched, Priced)
            | (Priced, ShippingQuoted)
            | (ShippingQuoted, Charged) => true,
            (Initiated | CartFetched | Priced | ShippingQuoted, Failed) => true,
            (Charged, Shipped | CartEmptied | Completed) => true,
            (Shipped, CartEmptied | Completed) => true,
            (CartEmptied, Completed) => true,
            _ => false,
        }
    }

    /// Returns true once money has been captured.
    pub fn is_charged(&self) -> bool {
        matches!(
            self,
            SagaState::Charged | SagaState::Shipped | SagaState::CartEmptied | SagaState::Completed
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Initiated => "Initiated",
            SagaState::CartFetched => "CartFetched",
            SagaState::Priced => "Priced",
            SagaState::ShippingQuoted => "ShippingQuoted",
            SagaState::Charged => "Charged",
            SagaState::Shipped => "Shipped",
            SagaState::CartEmptied => "CartEmptied",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
