//! Cross-thread call submission and result handles.
//!
//! A [`Submitter`] lets any thread hand the loop a *factory* for a `!Send`
//! future and get back a [`CallHandle`]: a waitable, cancellable claim on
//! the call's eventual outcome. The factory crosses threads (it must be
//! `Send`); the future it builds never does, because it is constructed and
//! polled entirely on the loop thread.
//!
//! # Outcome guarantee
//!
//! Every submitted call resolves its handle exactly once, no matter how it
//! dies: value, [`CallError::Cancelled`], [`CallError::Panicked`], or
//! [`CallError::LoopStopped`] if the loop went away first. A waiter is
//! never left hanging on a call that will not report back.
//!
//! # Cancellation
//!
//! [`CallHandle::cancel`] is safe from any thread and idempotent. Once
//! requested, cancellation wins: even if the call's future finishes in the
//! same instant, the handle reports `Cancelled`. Requesting after the
//! result is already delivered is a no-op.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

use weft_types::CallId;

use crate::cancel::CancelToken;
use crate::cell::{FulfillOnDrop, ResultCell, TakeError};
use crate::error::CallError;
use crate::event_loop::LoopHandle;
use crate::scope::ScopeHandle;

/// Extracts a human-readable message from a panic payload.
pub(crate) fn panic_text(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(text) => *text,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(text) => (*text).to_string(),
            Err(_) => "opaque panic payload".to_string(),
        },
    }
}

fn join_error_text(err: JoinError) -> String {
    if err.is_panic() {
        panic_text(err.into_panic())
    } else {
        "task aborted".to_string()
    }
}

/// Cross-thread entry point for submitting calls into one scope.
///
/// Cheap to clone; all clones feed the same [`ScopeHandle`], so every call
/// they submit is tracked by (and torn down with) that scope.
#[derive(Clone)]
pub struct Submitter {
    scope: ScopeHandle,
}

impl Submitter {
    /// Creates a submitter feeding the given scope.
    #[must_use]
    pub fn new(scope: ScopeHandle) -> Self {
        Self { scope }
    }

    /// Returns the scope every submitted call is tracked by.
    #[must_use]
    pub fn scope(&self) -> &ScopeHandle {
        &self.scope
    }

    /// Returns the handle of the loop this submitter feeds.
    #[must_use]
    pub fn loop_handle(&self) -> &LoopHandle {
        self.scope.loop_handle()
    }

    /// Submits a call: `factory` runs on the loop thread, the future it
    /// returns is spawned there under the submitter's scope.
    ///
    /// Never blocks. Failures surface on the returned handle, not here:
    /// a stopped loop yields [`CallError::LoopStopped`], a closing scope
    /// yields [`CallError::Cancelled`].
    ///
    /// The call's own application errors should travel inside `T` (use
    /// `T = Result<V, E>`); [`CallError`] is reserved for what the bridge
    /// did to the call.
    pub fn submit<F, Fut, T>(&self, factory: F) -> CallHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
        T: Send + 'static,
    {
        let id = CallId::new();
        let cell: Arc<ResultCell<Result<T, CallError>>> = Arc::new(ResultCell::new());
        let cancel = CancelToken::new();

        let guard = FulfillOnDrop::new(cell.clone(), Err(CallError::LoopStopped));
        let scope = self.scope.clone();
        let call_cancel = cancel.clone();

        // If scheduling fails (or the job is dropped unrun at shutdown),
        // the guard resolves the handle with LoopStopped.
        let _ = self.loop_handle().schedule(move || {
            if call_cancel.is_cancelled() {
                debug!("call {} cancelled before start; not spawned", id);
                guard.fulfill(Err(CallError::Cancelled));
                return;
            }
            let Ok(task_guard) = scope.try_begin_task() else {
                debug!("call {} arrived after scope teardown began", id);
                guard.fulfill(Err(CallError::Cancelled));
                return;
            };
            let scope_cancel = scope.cancel_token();

            // A factory that panics must not take the loop thread down.
            let fut = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(factory)) {
                Ok(fut) => fut,
                Err(payload) => {
                    guard.fulfill(Err(CallError::Panicked(panic_text(payload))));
                    return;
                }
            };

            let join = tokio::task::spawn_local(fut);
            tokio::task::spawn_local(async move {
                let _task_guard = task_guard;
                let outcome = supervise(join, &call_cancel, &scope_cancel).await;
                guard.fulfill(outcome);
            });
        });

        CallHandle {
            id,
            cell,
            cancel,
            handle: self.loop_handle().clone(),
            detached: false,
        }
    }
}

/// Races the call against both cancellation signals.
async fn supervise<T>(
    mut join: JoinHandle<T>,
    call_cancel: &CancelToken,
    scope_cancel: &CancelToken,
) -> Result<T, CallError> {
    tokio::select! {
        biased;
        () = cancel_requested(call_cancel, scope_cancel) => {
            join.abort();
            // Wait the task out so its destructors run before the handle
            // observes the cancellation.
            let _ = (&mut join).await;
            Err(CallError::Cancelled)
        }
        result = &mut join => match result {
            Ok(value) => Ok(value),
            Err(err) if err.is_cancelled() => Err(CallError::Cancelled),
            Err(err) => Err(CallError::Panicked(join_error_text(err))),
        }
    }
}

async fn cancel_requested(call: &CancelToken, scope: &CancelToken) {
    tokio::select! {
        () = call.cancelled() => {}
        () = scope.cancelled() => {}
    }
}

/// Waitable, cancellable claim on one submitted call's outcome.
///
/// The result can be taken exactly once, through either wait style; a
/// second take reports [`CallError::AlreadyConsumed`]. A bounded wait that
/// times out leaves the handle intact for another attempt.
///
/// Dropping an unfinished handle cancels its call: an outcome nobody can
/// observe should not keep running. Call [`detach`](Self::detach) for
/// deliberate fire-and-forget.
#[must_use = "dropping a call handle cancels the call; use detach() for fire-and-forget"]
pub struct CallHandle<T> {
    id: CallId,
    cell: Arc<ResultCell<Result<T, CallError>>>,
    cancel: CancelToken,
    handle: LoopHandle,
    detached: bool,
}

impl<T> CallHandle<T> {
    /// Identifier of this call, stable across logs on both sides.
    #[must_use]
    pub fn id(&self) -> CallId {
        self.id
    }

    /// Returns whether the outcome has been delivered (taken or not).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.cell.is_fulfilled()
    }

    /// Requests cancellation of the call. Any thread, idempotent, no-op
    /// once the outcome is already delivered.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Lets the call keep running after this handle is dropped.
    pub fn detach(mut self) {
        self.detached = true;
    }

    /// Blocks until the outcome is delivered, or until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// [`CallError::WouldDeadlock`] on the loop thread itself,
    /// [`CallError::WaitTimeout`] on a lapsed bound (handle stays usable),
    /// [`CallError::AlreadyConsumed`] if the outcome was already taken.
    pub fn result(&self, timeout: Option<Duration>) -> Result<T, CallError> {
        if self.handle.is_on_loop_thread() {
            return Err(CallError::WouldDeadlock);
        }
        match self.cell.wait_blocking(timeout) {
            Ok(outcome) => outcome,
            Err(TakeError::Empty) => Err(CallError::WaitTimeout),
            Err(TakeError::Consumed) => Err(CallError::AlreadyConsumed),
        }
    }

    /// Awaits the outcome from any async context, including the loop
    /// itself.
    ///
    /// # Errors
    ///
    /// [`CallError::AlreadyConsumed`] if the outcome was already taken;
    /// otherwise whatever the call resolved to.
    pub async fn awaited(&self) -> Result<T, CallError> {
        match self.cell.wait().await {
            Ok(outcome) => outcome,
            Err(_) => Err(CallError::AlreadyConsumed),
        }
    }
}

impl<T> Drop for CallHandle<T> {
    fn drop(&mut self) {
        if !self.detached && !self.cell.is_fulfilled() {
            debug!("call handle {} dropped while pending; cancelling", self.id);
            self.cancel.cancel();
        }
    }
}

impl<T> std::fmt::Debug for CallHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallHandle")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .field("cancel_requested", &self.cancel.is_cancelled())
            .finish()
    }
}
