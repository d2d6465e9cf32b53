//! Cooperative cancellation token.
//!
//! A [`CancelToken`] is the single cancellation signal shared by one scope
//! or one call: latched (once cancelled, always cancelled), cheap to clone,
//! and safe to trigger from any thread. Requesting cancellation never
//! blocks; observing it is an await point, which is exactly where
//! cooperative tasks are allowed to be interrupted.
//!
//! Built on `tokio::sync::watch` so async observers get woken without
//! polling and without the token needing to know who is listening.

use tokio::sync::watch;

/// A latched, cloneable cancellation signal.
///
/// All clones observe the same flag. There is no "uncancel".
///
/// # Example
///
/// ```
/// use weft_bridge::CancelToken;
///
/// let token = CancelToken::new();
/// let observer = token.clone();
///
/// assert!(!observer.is_cancelled());
/// token.cancel();
/// token.cancel(); // idempotent
/// assert!(observer.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: watch::Sender<bool>,
}

impl CancelToken {
    /// Creates a new, not-yet-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Requests cancellation.
    ///
    /// Never blocks; returns immediately regardless of how many observers
    /// exist or how long the cancelled work takes to actually stop.
    /// Idempotent: repeated calls are no-ops.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once cancellation has been requested.
    ///
    /// Returns immediately if the token is already cancelled. This is a
    /// cancellation checkpoint: racing a task against it in a `select!`
    /// makes the task interruptible at every one of its await points.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // borrow_and_update marks the current value seen, so changed()
        // below cannot miss a cancel that landed before subscribe().
        if *rx.borrow_and_update() {
            return;
        }
        loop {
            if rx.changed().await.is_err() {
                // All senders dropped without cancelling: the owning scope
                // is gone, stay pending forever rather than firing a
                // cancellation that was never requested.
                std::future::pending::<()>().await;
            }
            if *rx.borrow_and_update() {
                return;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
