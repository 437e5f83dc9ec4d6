use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::{FaultPolicy, FaultPolicyError, FaultPolicyProvider};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Polls a JSON policy file and swaps changes into a provider.
///
/// A missing or unparsable file leaves the current policy in place. Intervals
/// shorter than a millisecond are raised to one.
#[derive(Debug, Clone)]
pub struct FaultPolicyWatcher {
    path: PathBuf,
    interval: Duration,
    provider: Arc<FaultPolicyProvider>,
}

impl FaultPolicyWatcher {
    pub fn new(
        path: impl Into<PathBuf>,
        interval: Duration,
        provider: Arc<FaultPolicyProvider>,
    ) -> Self {
        Self {
            path: path.into(),
            interval: interval.max(MIN_INTERVAL),
            provider,
        }
    }

    /// Reads the file once. Returns true if the provider now holds a different policy.
    pub async fn reload_once(&self) -> Result<bool, FaultPolicyError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let policy = FaultPolicy::from_json(&raw)?;

        if *self.provider.snapshot() == policy {
            return Ok(false);
        }
        self.provider.replace(policy);
        Ok(true)
    }

    /// Starts polling in the background.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.reload_once().await {
                    Ok(true) => {
                        tracing::info!(path = %self.path.display(), "fault policy reloaded")
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(path = %self.path.display(), error = %e, "fault policy reload failed")
                    }
                }
            }
        })
    }
}
