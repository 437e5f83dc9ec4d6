use std::time::Duration;

use crate::error::ErrorClass;

/// What to do with one dependency call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultDecision {
    /// Call the dependency normally.
    Pass,

    /// Skip the dependency and fail with a synthetic error of this class.
    InjectError { class: ErrorClass, message: String },

    /// Sleep before calling the dependency. The sleep counts against the deadline.
    InjectLatency(Duration),
}

impl FaultDecision {
    pub fn is_pass(&self) -> bool {
        matches!(self, FaultDecision::Pass)
    }

    /// Label used for the `fault_injections_total` counter.
    pub fn kind(&self) -> &'static str {
        match self {
            FaultDecision::Pass => "pass",
            FaultDecision::InjectError { .. } => "error",
            FaultDecision::InjectLatency(_) => "latency",
        }
    }
}
