//! Caller-scoped cancellation.

use std::sync::Arc;

use tokio::sync::watch;

/// Signal a caller uses to withdraw its interest in a fetch.
///
/// Cancelling detaches only the callers holding this handle. A shared
/// request keeps running for every other caller attached to it.
///
/// ```
/// use fetchbox::CancelHandle;
///
/// let handle = CancelHandle::new();
/// let clone = handle.clone();
/// clone.cancel();
/// assert!(handle.is_cancelled());
/// ```
#[derive(Clone, Debug)]
pub struct CancelHandle {
    inner: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Creates a handle that is not cancelled yet.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(tx),
        }
    }

    /// Cancels the handle. Idempotent.
    pub fn cancel(&self) {
        self.inner.send_replace(true);
    }

    /// Returns true once [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        *self.inner.borrow()
    }

    /// Resolves once the handle is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CancelHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
