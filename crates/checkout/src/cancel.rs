//! Caller cancellation.

use tokio::sync::watch;

/// Creates a linked guard and signal.
///
/// The signal fires when the guard is dropped, which happens when the future
/// awaiting the checkout is dropped because the caller went away.
pub fn cancellation() -> (CancelGuard, CancelSignal) {
    let (sender, receiver) = watch::channel(false);
    (
        CancelGuard { sender },
        CancelSignal {
            receiver: Some(receiver),
        },
    )
}

/// Fires its [`CancelSignal`] on drop.
#[derive(Debug)]
pub struct CancelGuard {
    sender: watch::Sender<bool>,
}

impl CancelGuard {
    /// Fires the signal without waiting for the guard to drop.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.sender.send_replace(true);
    }
}

/// Observed by the saga before payment.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { receiver: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.receiver
            .as_ref()
            .is_some_and(|receiver| *receiver.borrow())
    }

    /// Resolves once the guard fires. Pending forever otherwise.
    pub async fn cancelled(&mut self) {
        if let Some(receiver) = self.receiver.as_mut() {
            if receiver.wait_for(|cancelled| *cancelled).await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}
