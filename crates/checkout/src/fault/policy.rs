use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::FaultDecision;
use crate::clients::Operation;
use crate::error::ErrorClass;

/// Errors loading a fault policy.
#[derive(Debug, Error)]
pub enum FaultPolicyError {
    #[error("Failed to read fault policy: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse fault policy: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid fault policy: {0}")]
    Invalid(String),
}

/// The call attributes a rule can match on.
#[derive(Debug, Clone, Copy)]
pub struct FaultContext<'a> {
    pub baggage: &'a BTreeMap<String, String>,
    pub user_id: Option<&'a str>,
}

/// Requires a baggage entry with an exact value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaggageMatch {
    pub key: String,
    pub value: String,
}

/// What a matching rule does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FaultAction {
    Error {
        kind: ErrorClass,
        #[serde(default)]
        message: Option<String>,
    },
    Latency {
        millis: u64,
    },
}

/// One fault rule. All present conditions must hold for the rule to match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRule {
    pub operation: Operation,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baggage: Option<BaggageMatch>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default = "enabled")]
    pub enabled: bool,

    pub action: FaultAction,
}

fn enabled() -> bool {
    true
}

impl FaultRule {
    pub fn new(operation: Operation, action: FaultAction) -> Self {
        Self {
            operation,
            baggage: None,
            user_id: None,
            enabled: true,
            action,
        }
    }

    pub fn when_baggage(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.baggage = Some(BaggageMatch {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    fn matches(&self, operation: Operation, ctx: &FaultContext<'_>) -> bool {
        if !self.enabled || self.operation != operation {
            return false;
        }
        if let Some(wanted) = &self.baggage {
            if ctx.baggage.get(&wanted.key) != Some(&wanted.value) {
                return false;
            }
        }
        if let Some(user) = &self.user_id {
            if ctx.user_id != Some(user.as_str()) {
                return false;
            }
        }
        true
    }

    fn decision(&self) -> FaultDecision {
        match &self.action {
            FaultAction::Error { kind, message } => FaultDecision::InjectError {
                class: *kind,
                message: message
                    .clone()
                    .unwrap_or_else(|| format!("injected {kind} fault")),
            },
            FaultAction::Latency { millis } => {
                FaultDecision::InjectLatency(Duration::from_millis(*millis))
            }
        }
    }
}

/// An immutable set of fault rules. The first matching rule wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultPolicy {
    #[serde(default)]
    pub version: u64,

    #[serde(default)]
    pub rules: Vec<FaultRule>,
}

impl FaultPolicy {
    /// A policy that never injects anything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(version: u64, rules: Vec<FaultRule>) -> Self {
        Self { version, rules }
    }

    pub fn from_json(json: &str) -> Result<Self, FaultPolicyError> {
        let policy: FaultPolicy = serde_json::from_str(json)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Rejects rules whose conditions can never be satisfied.
    pub fn validate(&self) -> Result<(), FaultPolicyError> {
        for (index, rule) in self.rules.iter().enumerate() {
            if let Some(wanted) = &rule.baggage {
                if wanted.key.trim().is_empty() {
                    return Err(FaultPolicyError::Invalid(format!(
                        "rule {index}: baggage key must not be empty"
                    )));
                }
            }
            if rule.user_id.as_deref().is_some_and(|u| u.trim().is_empty()) {
                return Err(FaultPolicyError::Invalid(format!(
                    "rule {index}: user_id must not be empty"
                )));
            }
        }
        Ok(())
    }

    pub fn decide(&self, operation: Operation, ctx: &FaultContext<'_>) -> FaultDecision {
        self.rules
            .iter()
            .find(|rule| rule.matches(operation, ctx))
            .map(FaultRule::decision)
            .unwrap_or(FaultDecision::Pass)
    }
}

/// Process-wide holder of the current fault policy.
///
/// Reads are lock-free snapshot loads; a replacement never blocks or disturbs
/// a call that already loaded the previous policy.
pub struct FaultPolicyProvider {
    current: ArcSwap<FaultPolicy>,
}

impl FaultPolicyProvider {
    pub fn new(policy: FaultPolicy) -> Self {
        Self {
            current: ArcSwap::from_pointee(policy),
        }
    }

    pub fn disabled() -> Self {
        Self::new(FaultPolicy::disabled())
    }

    pub fn decide(&self, operation: Operation, ctx: &FaultContext<'_>) -> FaultDecision {
        self.current.load().decide(operation, ctx)
    }

    pub fn snapshot(&self) -> Arc<FaultPolicy> {
        self.current.load_full()
    }

    /// Installs a new policy and returns the one it replaced.
    pub fn replace(&self, policy: FaultPolicy) -> Arc<FaultPolicy> {
        let previous = self.current.swap(Arc::new(policy));
        tracing::info!(
            previous_version = previous.version,
            version = self.current.load().version,
            rules = self.current.load().rules.len(),
            "fault policy replaced"
        );
        previous
    }
}

impl Default for FaultPolicyProvider {
    fn default() -> Self {
        Self::disabled()
    }
}

impl std::fmt::Debug for FaultPolicyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultPolicyProvider")
            .field("version", &self.current.load().version)
            .finish()
    }
}
