//! Run cancellation.
//!
//! A [`CancelSignal`] is handed to the executor; cancelling it abandons the
//! in-flight tool call or backoff sleep and fails the run with
//! [`crate::error::Error::Cancelled`]. Clones share one flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Cancellation flag shared between a run and whoever may stop it.
///
/// # Example
///
/// ```rust
/// use stepwright::shutdown::CancelSignal;
///
/// async fn example() {
///     let cancel = CancelSignal::new();
///     let watcher = cancel.clone();
///     tokio::spawn(async move { watcher.cancelled().await });
///     cancel.cancel();
///     assert!(cancel.is_cancelled());
/// }
/// ```
#[derive(Clone, Default)]
pub struct CancelSignal {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Calling it again has no further effect.
    pub fn cancel(&self) {
        let was_cancelled = self.cancelled.swap(true, Ordering::SeqCst);
        if !was_cancelled {
            info!("Run cancellation requested");
            self.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation is requested (immediately if it already was).
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent cancel is not missed.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Cancel when the process receives Ctrl+C.
    pub fn cancel_on_ctrl_c(&self) {
        let cancel = self.clone();
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, cancelling run");
                    cancel.cancel();
                }
                Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
            }
        });
    }
}

impl std::fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelSignal")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_initial_state() {
        assert!(!CancelSignal::new().is_cancelled());
    }

    #[test]
    fn test_cancel_is_shared_and_idempotent() {
        let a = CancelSignal::new();
        let b = a.clone();
        a.cancel();
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_returns_when_already_cancelled() {
        let signal = CancelSignal::new();
        signal.cancel();
        tokio::time::timeout(Duration::from_millis(100), signal.cancelled())
            .await
            .expect("should resolve immediately");
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let signal = CancelSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.cancel();

        tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}
