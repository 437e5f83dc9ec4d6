use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::clients::{CallContext, Operation};
use crate::error::ClientError;
use crate::propagation::TraceContext;

/// A failure an in-memory client returns instead of doing its work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedFailure {
    Transient(String),
    Permanent(String),
}

impl ScriptedFailure {
    fn into_error(self, operation: Operation) -> ClientError {
        match self {
            ScriptedFailure::Transient(msg) => ClientError::transient(operation, msg),
            ScriptedFailure::Permanent(msg) => ClientError::permanent(operation, msg),
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    queued: VecDeque<ScriptedFailure>,
    always: Option<ScriptedFailure>,
    latency: Option<Duration>,
    calls: u32,
    traces: Vec<TraceContext>,
}

/// Per-operation behaviour shared by the in-memory clients.
///
/// Tests use it to queue failures, add latency, count calls and inspect the
/// trace context each call arrived with.
#[derive(Debug, Clone, Default)]
pub struct Scripts {
    inner: Arc<Mutex<HashMap<Operation, Script>>>,
}

impl Scripts {
    fn lock(&self) -> MutexGuard<'_, HashMap<Operation, Script>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fails the next call of `operation`. Queued failures are consumed in order.
    pub fn fail_next(&self, operation: Operation, failure: ScriptedFailure) {
        self.lock()
            .entry(operation)
            .or_default()
            .queued
            .push_back(failure);
    }

    /// Fails the next `count` calls of `operation` with the same failure.
    pub fn fail_times(&self, operation: Operation, count: usize, failure: ScriptedFailure) {
        for _ in 0..count {
            self.fail_next(operation, failure.clone());
        }
    }

    /// Fails every call of `operation` until cleared.
    pub fn fail_always(&self, operation: Operation, failure: ScriptedFailure) {
        self.lock().entry(operation).or_default().always = Some(failure);
    }

    /// Delays every call of `operation`.
    pub fn set_latency(&self, operation: Operation, latency: Duration) {
        self.lock().entry(operation).or_default().latency = Some(latency);
    }

    /// Removes every scripted failure and latency, keeping call counts.
    pub fn clear(&self) {
        for script in self.lock().values_mut() {
            script.queued.clear();
            script.always = None;
            script.latency = None;
        }
    }

    /// Number of times `operation` was called, including failed calls.
    pub fn calls(&self, operation: Operation) -> u32 {
        self.lock().get(&operation).map_or(0, |s| s.calls)
    }

    /// Trace contexts of every call of `operation`, oldest first.
    pub fn traces(&self, operation: Operation) -> Vec<TraceContext> {
        self.lock()
            .get(&operation)
            .map(|s| s.traces.clone())
            .unwrap_or_default()
    }

    /// Records a call and applies the scripted behaviour for it.
    pub(crate) async fn enter(
        &self,
        operation: Operation,
        ctx: &CallContext,
    ) -> Result<(), ClientError> {
        let (latency, failure) = {
            let mut scripts = self.lock();
            let script = scripts.entry(operation).or_default();
            script.calls += 1;
            script.traces.push(ctx.trace.clone());
            let failure = script
                .queued
                .pop_front()
                .or_else(|| script.always.clone());
            (script.latency, failure)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(failure) => Err(failure.into_error(operation)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CallContext {
        CallContext::with_timeout(TraceContext::new_root(), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_queued_then_always() {
        let scripts = Scripts::default();
        let ctx = ctx();
        scripts.fail_next(Operation::Quote, ScriptedFailure::Transient("blip".into()));
        scripts.fail_always(Operation::Quote, ScriptedFailure::Permanent("down".into()));

        let first = scripts.enter(Operation::Quote, &ctx).await.unwrap_err();
        assert!(first.is_retryable());
        let second = scripts.enter(Operation::Quote, &ctx).await.unwrap_err();
        assert!(!second.is_retryable());

        scripts.clear();
        assert!(scripts.enter(Operation::Quote, &ctx).await.is_ok());
        assert_eq!(scripts.calls(Operation::Quote), 3);
        assert_eq!(scripts.calls(Operation::Charge), 0);
    }

    #[tokio::test]
    async fn test_records_trace_of_each_call() {
        let scripts = Scripts::default();
        let ctx = ctx();

        scripts.enter(Operation::Convert, &ctx).await.unwrap();
        scripts.enter(Operation::Convert, &ctx.clone()).await.unwrap();

        let traces = scripts.traces(Operation::Convert);
        assert_eq!(traces.len(), 2);
        assert!(traces.iter().all(|t| t.trace_id() == ctx.trace.trace_id()));
        assert!(scripts.traces(Operation::Charge).is_empty());
    }
}
