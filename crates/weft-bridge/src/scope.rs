//! Structured task scopes on the loop thread.
//!
//! A [`TaskScope`] is the ownership boundary for a family of cooperative
//! tasks: every task spawned through it is tracked, shares one
//! [`CancelToken`], and is guaranteed to be finished (or cancelled and
//! drained) before the scope's teardown returns. No task outlives its
//! scope, and the owning [`EventLoop`] refuses to stop while any scope is
//! still bound. Teardown order is enforced, not hoped for.
//!
//! # Lifecycle
//!
//! ```text
//! enter / enter_remote          exit().await  |  close()
//!        │                            │
//!        ▼        spawn(...)          ▼
//!      Open ───────────────────► Closing ───► Closed
//!                                   │
//!                     cancel token fires, tasks drain
//! ```
//!
//! `Open → Closing` happens exactly once; spawns against a `Closing` or
//! `Closed` scope fail with [`BridgeError::ScopeClosed`].
//!
//! [`EventLoop`]: crate::event_loop::EventLoop

use std::future::Future;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::cell::{FulfillOnDrop, ResultCell};
use crate::error::BridgeError;
use crate::event_loop::LoopHandle;

const STATE_OPEN: u8 = 0;
const STATE_CLOSING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Lifecycle state of a task scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    /// Accepting spawns.
    Open,
    /// Teardown requested; cancel token fired, tasks draining.
    Closing,
    /// All tasks finished; scope released.
    Closed,
}

impl ScopeState {
    fn from_u8(v: u8) -> Self {
        match v {
            STATE_OPEN => Self::Open,
            STATE_CLOSING => Self::Closing,
            _ => Self::Closed,
        }
    }
}

struct ScopeCore {
    cancel: CancelToken,
    state: AtomicU8,
    /// Tasks spawned and not yet finished (includes call supervisors).
    active: AtomicUsize,
    /// Signalled when `active` drops to zero.
    idle: Notify,
}

/// Tracks one live task; finishing (or being dropped mid-cancel) is what
/// lets the scope's teardown observe quiescence.
pub(crate) struct TaskGuard {
    core: Arc<ScopeCore>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let prev = self.core.active.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            self.core.idle.notify_waiters();
        }
    }
}

/// A structured-concurrency scope bound to one event loop.
///
/// The scope itself is `Send` (it can be handed to another thread for
/// teardown), but spawning is a loop-thread-only operation, because the
/// futures it accepts are `!Send`.
pub struct TaskScope {
    core: Arc<ScopeCore>,
    handle: LoopHandle,
    released: bool,
}

impl TaskScope {
    /// Opens a scope. Must be called on the loop thread.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotOnLoopThread`] from any other thread; use
    /// [`enter_remote`](Self::enter_remote) there instead.
    pub fn enter(handle: &LoopHandle) -> Result<Self, BridgeError> {
        if !handle.is_on_loop_thread() {
            return Err(BridgeError::NotOnLoopThread);
        }
        handle.register_scope();
        debug!("task scope opened");
        Ok(Self {
            core: Arc::new(ScopeCore {
                cancel: CancelToken::new(),
                state: AtomicU8::new(STATE_OPEN),
                active: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
            handle: handle.clone(),
            released: false,
        })
    }

    /// Opens a scope from any thread by marshalling the entry onto the
    /// loop, blocking briefly for the round trip.
    ///
    /// On the loop thread itself this is just [`enter`](Self::enter).
    ///
    /// # Errors
    ///
    /// [`BridgeError::RuntimeStopped`] if the loop is not running.
    pub fn enter_remote(handle: &LoopHandle) -> Result<Self, BridgeError> {
        if handle.is_on_loop_thread() {
            return Self::enter(handle);
        }

        let cell = Arc::new(ResultCell::new());
        let guard = FulfillOnDrop::new(cell.clone(), Err(BridgeError::RuntimeStopped));
        let job_handle = handle.clone();
        handle.schedule(move || {
            guard.fulfill(TaskScope::enter(&job_handle));
        })?;

        match cell.wait_blocking(None) {
            Ok(result) => result,
            // The cell is fulfilled exactly once; a take failure cannot
            // happen with this private cell.
            Err(_) => Err(BridgeError::RuntimeStopped),
        }
    }

    /// Returns a cloneable, thread-safe handle to this scope.
    #[must_use]
    pub fn handle(&self) -> ScopeHandle {
        ScopeHandle {
            core: self.core.clone(),
            handle: self.handle.clone(),
        }
    }

    /// Spawns an infallible task into the scope. Loop thread only.
    ///
    /// The task races against the scope's cancel token: every await point
    /// inside it is a cancellation checkpoint.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotOnLoopThread`] off the loop thread,
    /// [`BridgeError::ScopeClosed`] once teardown has begun.
    pub fn spawn<F>(&self, name: &'static str, fut: F) -> Result<(), BridgeError>
    where
        F: Future<Output = ()> + 'static,
    {
        self.spawn_fallible(name, async move {
            fut.await;
            Ok::<(), std::convert::Infallible>(())
        })
    }

    /// Spawns a fallible task; a task error is logged, never propagated.
    ///
    /// Task failures are isolated by design: one task's error must not
    /// take down its siblings. Callers that need the outcome submit a
    /// call instead of spawning.
    pub fn spawn_fallible<F, E>(&self, name: &'static str, fut: F) -> Result<(), BridgeError>
    where
        F: Future<Output = Result<(), E>> + 'static,
        E: std::fmt::Display + 'static,
    {
        if !self.handle.is_on_loop_thread() {
            return Err(BridgeError::NotOnLoopThread);
        }
        let guard = self.handle().try_begin_task()?;
        let cancel = self.core.cancel.clone();

        tokio::task::spawn_local(async move {
            let _guard = guard;
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("task '{}' cancelled by scope", name);
                }
                result = fut => {
                    if let Err(err) = result {
                        warn!("task '{}' failed: {}", name, err);
                    }
                }
            }
        });
        Ok(())
    }

    /// Tears the scope down from the loop thread: fires the cancel token,
    /// waits for every task to drain, then releases the scope.
    ///
    /// Await this inside the loop (typically from a scheduled job); the
    /// tasks being drained run on the same thread as the awaiter.
    pub async fn exit(mut self) {
        self.released = true;
        let core = self.core.clone();
        let handle = self.handle.clone();
        run_teardown(&core).await;
        handle.release_scope();
    }

    /// Tears the scope down from an external thread, blocking until every
    /// task has drained.
    ///
    /// # Errors
    ///
    /// [`BridgeError::WouldDeadlock`] on the loop thread (use
    /// [`exit`](Self::exit) there). If the loop has already stopped the
    /// tasks are gone with it; the scope is released and `Ok` returned.
    pub fn close(mut self) -> Result<(), BridgeError> {
        if self.handle.is_on_loop_thread() {
            return Err(BridgeError::WouldDeadlock);
        }
        self.released = true;
        let core = self.core.clone();
        let handle = self.handle.clone();

        let cell: Arc<ResultCell<()>> = Arc::new(ResultCell::new());
        let guard = FulfillOnDrop::new(cell.clone(), ());
        let job_core = core.clone();
        let scheduled = handle.schedule(move || {
            tokio::task::spawn_local(async move {
                run_teardown(&job_core).await;
                guard.fulfill(());
            });
        });

        match scheduled {
            Ok(()) => {
                // Fulfilled by the teardown task, or by the guard if the
                // loop dropped the job during shutdown.
                let _ = cell.wait_blocking(None);
            }
            Err(_) => {
                // Loop already stopped: its LocalSet (and every task in
                // it) is gone, so the scope is trivially quiescent.
                core.cancel.cancel();
                core.state.store(STATE_CLOSED, Ordering::Release);
            }
        }
        handle.release_scope();
        Ok(())
    }
}

impl std::fmt::Debug for TaskScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScope")
            .field("state", &ScopeState::from_u8(self.core.state.load(Ordering::Acquire)))
            .field("active_tasks", &self.core.active.load(Ordering::Acquire))
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        if !self.released {
            warn!("task scope dropped without exit/close; cancelling its tasks");
            self.core.state.store(STATE_CLOSING, Ordering::Release);
            self.core.cancel.cancel();
            self.handle.release_scope();
        }
    }
}

/// `Open → Closing`, fire the token, wait for quiescence, `→ Closed`.
async fn run_teardown(core: &Arc<ScopeCore>) {
    core.state.store(STATE_CLOSING, Ordering::Release);
    core.cancel.cancel();
    let draining = core.active.load(Ordering::Acquire);
    if draining > 0 {
        debug!("scope closing; draining {} task(s)", draining);
    }

    loop {
        let notified = core.idle.notified();
        tokio::pin!(notified);
        // Register before checking so a final task finishing between the
        // check and the await cannot strand the teardown.
        notified.as_mut().enable();

        if core.active.load(Ordering::Acquire) == 0 {
            break;
        }
        notified.await;
    }

    core.state.store(STATE_CLOSED, Ordering::Release);
    debug!("task scope closed");
}

/// Cloneable, thread-safe view of a [`TaskScope`].
///
/// Carries everything the cross-thread side needs: cancellation, state
/// inspection, and (crate-internally) task accounting for submitted calls.
#[derive(Clone)]
pub struct ScopeHandle {
    core: Arc<ScopeCore>,
    handle: LoopHandle,
}

impl ScopeHandle {
    /// Requests cancellation of every task in the scope.
    ///
    /// Safe from any thread; returns immediately. The token is latched,
    /// so repeated calls are no-ops.
    pub fn cancel(&self) {
        self.core.cancel.cancel();
    }

    /// Returns whether the scope's cancel token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.core.cancel.is_cancelled()
    }

    /// Returns the scope's lifecycle state.
    #[must_use]
    pub fn state(&self) -> ScopeState {
        ScopeState::from_u8(self.core.state.load(Ordering::Acquire))
    }

    /// Returns the number of live tasks (including call supervisors).
    #[must_use]
    pub fn active_tasks(&self) -> usize {
        self.core.active.load(Ordering::Acquire)
    }

    pub(crate) fn loop_handle(&self) -> &LoopHandle {
        &self.handle
    }

    pub(crate) fn cancel_token(&self) -> CancelToken {
        self.core.cancel.clone()
    }

    /// Claims a task slot, failing once teardown has begun.
    pub(crate) fn try_begin_task(&self) -> Result<TaskGuard, BridgeError> {
        if self.core.state.load(Ordering::Acquire) != STATE_OPEN {
            return Err(BridgeError::ScopeClosed);
        }
        self.core.active.fetch_add(1, Ordering::AcqRel);
        Ok(TaskGuard {
            core: self.core.clone(),
        })
    }
}

impl std::fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeHandle")
            .field("state", &self.state())
            .field("active_tasks", &self.active_tasks())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::{EventLoop, LoopConfig};
    use std::sync::atomic::AtomicU32;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    fn start_loop() -> EventLoop {
        EventLoop::start(LoopConfig::default()).expect("loop must start")
    }

    #[test]
    fn enter_requires_loop_thread() {
        let mut event_loop = start_loop();
        let err = TaskScope::enter(event_loop.handle()).unwrap_err();
        assert!(matches!(err, BridgeError::NotOnLoopThread));
        event_loop.stop().unwrap();
    }

    #[test]
    fn enter_remote_opens_and_close_releases() {
        let mut event_loop = start_loop();
        let scope = TaskScope::enter_remote(event_loop.handle()).unwrap();
        assert_eq!(scope.handle().state(), ScopeState::Open);

        // Loop refuses to stop while the scope is bound.
        assert!(matches!(
            event_loop.stop(),
            Err(BridgeError::ResourceStillBound(1))
        ));

        scope.close().unwrap();
        event_loop.stop().unwrap();
    }

    #[test]
    fn spawned_tasks_run_and_exit_waits_for_them() {
        let mut event_loop = start_loop();
        let scope = TaskScope::enter_remote(event_loop.handle()).unwrap();
        let counter = Arc::new(AtomicU32::new(0));
        let (scope_tx, scope_rx) = std_mpsc::channel();
        let (bumped_tx, bumped_rx) = std_mpsc::channel();
        let (done_tx, done_rx) = std_mpsc::channel();

        let job_counter = counter.clone();
        event_loop
            .handle()
            .schedule(move || {
                for _ in 0..3 {
                    let counter = job_counter.clone();
                    let bumped = bumped_tx.clone();
                    scope
                        .spawn("bump", async move {
                            tokio::task::yield_now().await;
                            counter.fetch_add(1, Ordering::SeqCst);
                            bumped.send(()).unwrap();
                        })
                        .unwrap();
                }
                scope_tx.send(scope).unwrap();
            })
            .unwrap();

        // Exit cancels still-running children at their next checkpoint,
        // so let all three finish before requesting teardown.
        let scope = scope_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        for _ in 0..3 {
            bumped_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        }

        event_loop
            .handle()
            .schedule(move || {
                tokio::task::spawn_local(async move {
                    scope.exit().await;
                    done_tx.send(()).unwrap();
                });
            })
            .unwrap();

        done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("exit must complete");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        event_loop.stop().unwrap();
    }

    #[test]
    fn close_cancels_long_running_tasks() {
        let mut event_loop = start_loop();
        let (scope_tx, scope_rx) = std_mpsc::channel();
        let handle = event_loop.handle().clone();

        event_loop
            .handle()
            .schedule(move || {
                let scope = TaskScope::enter(&handle).unwrap();
                for _ in 0..3 {
                    scope
                        .spawn("forever", async {
                            std::future::pending::<()>().await;
                        })
                        .unwrap();
                }
                scope_tx.send(scope).unwrap();
            })
            .unwrap();

        let scope = scope_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let view = scope.handle();
        // Bounded close despite never-finishing tasks.
        scope.close().unwrap();
        assert_eq!(view.state(), ScopeState::Closed);
        assert_eq!(view.active_tasks(), 0);
        event_loop.stop().unwrap();
    }

    #[test]
    fn spawn_after_close_begins_fails() {
        let mut event_loop = start_loop();
        let (tx, rx) = std_mpsc::channel();
        let handle = event_loop.handle().clone();

        event_loop
            .handle()
            .schedule(move || {
                let scope = TaskScope::enter(&handle).unwrap();
                let view = scope.handle();
                tokio::task::spawn_local(async move {
                    while view.state() == ScopeState::Open {
                        tokio::task::yield_now().await;
                    }
                    let err = view.try_begin_task().err();
                    tx.send(err).unwrap();
                });
                tokio::task::spawn_local(scope.exit());
            })
            .unwrap();

        let err = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(err, Some(BridgeError::ScopeClosed)));
        event_loop.stop().unwrap();
    }

    #[test]
    fn handle_cancel_reaches_tasks_from_external_thread() {
        let mut event_loop = start_loop();
        let scope = TaskScope::enter_remote(event_loop.handle()).unwrap();
        let view = scope.handle();
        let (seen_tx, seen_rx) = std_mpsc::channel();

        event_loop
            .handle()
            .schedule({
                let token = view.cancel_token();
                move || {
                    tokio::task::spawn_local(async move {
                        token.cancelled().await;
                        seen_tx.send(()).unwrap();
                    });
                }
            })
            .unwrap();

        view.cancel();
        seen_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("cancel must reach loop tasks");

        scope.close().unwrap();
        event_loop.stop().unwrap();
    }

    #[test]
    fn dropping_scope_without_teardown_cancels_and_releases() {
        let mut event_loop = start_loop();
        let scope = TaskScope::enter_remote(event_loop.handle()).unwrap();
        let view = scope.handle();

        drop(scope);
        assert!(view.is_cancelled());
        // The bound-scope count went back down, so stop succeeds.
        event_loop.stop().unwrap();
    }

    #[test]
    fn close_on_loop_thread_would_deadlock() {
        let mut event_loop = start_loop();
        let (tx, rx) = std_mpsc::channel();
        let handle = event_loop.handle().clone();

        event_loop
            .handle()
            .schedule(move || {
                let scope = TaskScope::enter(&handle).unwrap();
                let err = scope.close().unwrap_err();
                tx.send(matches!(err, BridgeError::WouldDeadlock)).unwrap();
            })
            .unwrap();

        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        event_loop.stop().unwrap();
    }
}
