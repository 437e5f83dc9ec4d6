//! Fault injection for exercising the orchestrator under controlled chaos.
//!
//! A [`FaultPolicyProvider`] holds the current [`FaultPolicy`] as an immutable
//! snapshot that can be swapped atomically. Every dependency call asks it for
//! a [`FaultDecision`] right before going out.

mod decision;
mod policy;
mod watcher;

pub use decision::FaultDecision;
pub use policy::{
    BaggageMatch, FaultAction, FaultContext, FaultPolicy, FaultPolicyError, FaultPolicyProvider,
    FaultRule,
};
pub use watcher::FaultPolicyWatcher;
