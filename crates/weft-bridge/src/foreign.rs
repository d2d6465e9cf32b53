//! Adapting native promises into loop-awaitable futures.
//!
//! [`bind`] splits one pending native operation into two halves:
//!
//! - [`ForeignPromise`]: held by the native side, resolved exactly once
//!   from any thread ([`complete`], [`fail`], or [`cancelled`]).
//! - [`ForeignFuture`]: held by the awaiting side, waited on inside the
//!   loop, cancellable from either direction.
//!
//! # The wake guarantee
//!
//! A bound operation always reports back. The promise is consumed by its
//! resolving methods, and *dropping it unresolved delivers a cancellation
//! acknowledgement*: a native side that errors out, or simply forgets,
//! cannot strand the awaiter. Symmetrically, dropping the future requests
//! cancellation of the native side, so abandoned awaiters do not leak
//! running native work.
//!
//! # Cancellation wins
//!
//! Once [`ForeignFuture::cancel`] has been called, the awaiter observes
//! [`ForeignOutcome::Cancelled`] even if a value or error arrives in the
//! same instant. Cancellation requested after resolution is a no-op. The
//! cancellation callback runs at most once: on the loop thread if the
//! binding was created there, otherwise inline on whichever thread
//! requested the cancellation.
//!
//! [`complete`]: ForeignPromise::complete
//! [`fail`]: ForeignPromise::fail
//! [`cancelled`]: ForeignPromise::cancelled

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use weft_types::BindingId;

use crate::cell::ResultCell;
use crate::event_loop::LoopHandle;

/// Terminal outcome of one bound native operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignOutcome<T, E> {
    /// The native side produced a value.
    Value(T),
    /// The native side failed.
    Error(E),
    /// The operation was cancelled (by either side) before resolving.
    Cancelled,
}

impl<T, E> ForeignOutcome<T, E> {
    /// Converts into a `Result`, mapping `Cancelled` through `on_cancel`.
    pub fn into_result(self, on_cancel: impl FnOnce() -> E) -> Result<T, E> {
        match self {
            Self::Value(v) => Ok(v),
            Self::Error(e) => Err(e),
            Self::Cancelled => Err(on_cancel()),
        }
    }
}

/// How a cancellation request reaches the registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelRoute {
    /// Binding was created on the loop thread: the callback touches loop
    /// state, so requests from other threads are marshalled onto the loop.
    LoopLocal,
    /// Binding was created off the loop: the callback is thread-safe and
    /// runs inline wherever cancellation is requested.
    AnyThread,
}

struct ForeignCore<T, E> {
    id: BindingId,
    cell: ResultCell<ForeignOutcome<T, E>>,
    /// Latched by the awaiting side; makes late deliveries lose.
    cancel_requested: AtomicBool,
}

/// Creates a promise/future pair for one pending native operation.
///
/// `on_cancel` is invoked at most once when the awaiting side cancels (or
/// abandons) the binding; it should tell the native side to stop. The
/// dispatch route is fixed at bind time from the calling thread: bind on
/// the loop thread and the callback will always run there.
pub fn bind<T, E, C>(
    handle: &LoopHandle,
    on_cancel: C,
) -> (ForeignPromise<T, E>, ForeignFuture<T, E>)
where
    T: Send + 'static,
    E: Send + 'static,
    C: FnOnce() + Send + 'static,
{
    let id = BindingId::new();
    let route = if handle.is_on_loop_thread() {
        CancelRoute::LoopLocal
    } else {
        CancelRoute::AnyThread
    };
    let core = Arc::new(ForeignCore {
        id,
        cell: ResultCell::new(),
        cancel_requested: AtomicBool::new(false),
    });
    debug!("foreign binding {} created ({:?})", id, route);

    let promise = ForeignPromise {
        core: core.clone(),
        resolved: false,
    };
    let future = ForeignFuture {
        core,
        on_cancel: Some(Box::new(on_cancel)),
        route,
        handle: handle.clone(),
        finished: false,
    };
    (promise, future)
}

/// The native side's half of a binding: resolve exactly once.
///
/// All resolving methods consume the promise and are safe from any thread.
/// Dropping it unresolved counts as a cancellation acknowledgement; the
/// awaiter is woken no matter what.
#[must_use = "an unresolved promise acknowledges cancellation on drop"]
pub struct ForeignPromise<T, E> {
    core: Arc<ForeignCore<T, E>>,
    resolved: bool,
}

impl<T, E> ForeignPromise<T, E> {
    /// Identifier shared with the paired future.
    #[must_use]
    pub fn id(&self) -> BindingId {
        self.core.id
    }

    /// Resolves with a value.
    pub fn complete(mut self, value: T) {
        self.resolved = true;
        self.core.cell.fulfill(ForeignOutcome::Value(value));
    }

    /// Resolves with the native side's error.
    pub fn fail(mut self, error: E) {
        self.resolved = true;
        self.core.cell.fulfill(ForeignOutcome::Error(error));
    }

    /// Acknowledges a cancellation request (or reports a native-initiated
    /// cancellation).
    pub fn cancelled(mut self) {
        self.resolved = true;
        self.core.cell.fulfill(ForeignOutcome::Cancelled);
    }
}

impl<T, E> Drop for ForeignPromise<T, E> {
    fn drop(&mut self) {
        if !self.resolved {
            debug!(
                "foreign promise {} dropped unresolved; delivering cancellation",
                self.core.id
            );
            self.core.cell.fulfill(ForeignOutcome::Cancelled);
        }
    }
}

impl<T, E> std::fmt::Debug for ForeignPromise<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForeignPromise")
            .field("id", &self.core.id)
            .field("resolved", &self.resolved)
            .finish()
    }
}

/// The awaiting side's half of a binding.
///
/// Waiting consumes the future. Dropping it before (or while) waiting
/// requests cancellation of the native side, so an abandoned await cannot
/// leak running native work.
pub struct ForeignFuture<T, E> {
    core: Arc<ForeignCore<T, E>>,
    on_cancel: Option<Box<dyn FnOnce() + Send>>,
    route: CancelRoute,
    handle: LoopHandle,
    finished: bool,
}

impl<T, E> ForeignFuture<T, E> {
    /// Identifier shared with the paired promise.
    #[must_use]
    pub fn id(&self) -> BindingId {
        self.core.id
    }

    /// Returns whether the native side has resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.core.cell.is_fulfilled()
    }

    /// Requests cancellation of the native side.
    ///
    /// Idempotent; the callback runs at most once. A no-op if the promise
    /// has already resolved. Once requested, cancellation wins: a value
    /// racing in concurrently is discarded and the wait reports
    /// [`ForeignOutcome::Cancelled`].
    pub fn cancel(&mut self) {
        if self.core.cell.is_fulfilled() {
            return;
        }
        self.core.cancel_requested.store(true, Ordering::Release);
        if let Some(callback) = self.on_cancel.take() {
            self.dispatch_cancel(callback);
        }
    }

    /// Waits for the outcome. Resolves exactly once for every binding;
    /// see the module docs for the wake guarantee.
    pub async fn wait(mut self) -> ForeignOutcome<T, E> {
        let outcome = match self.core.cell.wait().await {
            Ok(outcome) => outcome,
            // Unreachable with a private, take-once cell; treat a second
            // take as an already-cancelled binding rather than panicking.
            Err(_) => ForeignOutcome::Cancelled,
        };
        self.finished = true;
        self.on_cancel = None;

        if self.core.cancel_requested.load(Ordering::Acquire)
            && !matches!(outcome, ForeignOutcome::Cancelled)
        {
            debug!(
                "foreign binding {}: late native outcome discarded, cancellation wins",
                self.core.id
            );
            return ForeignOutcome::Cancelled;
        }
        outcome
    }

    fn dispatch_cancel(&self, callback: Box<dyn FnOnce() + Send>) {
        match self.route {
            CancelRoute::AnyThread => callback(),
            CancelRoute::LoopLocal => {
                if self.handle.is_on_loop_thread() {
                    callback();
                } else if self.handle.schedule(callback).is_err() {
                    warn!(
                        "foreign binding {}: loop stopped before the cancellation \
                         callback could run",
                        self.core.id
                    );
                }
            }
        }
    }
}

impl<T, E> Drop for ForeignFuture<T, E> {
    fn drop(&mut self) {
        if self.finished || self.core.cell.is_fulfilled() {
            return;
        }
        self.core.cancel_requested.store(true, Ordering::Release);
        if let Some(callback) = self.on_cancel.take() {
            debug!(
                "foreign binding {}: awaiter dropped, cancelling native side",
                self.core.id
            );
            self.dispatch_cancel(callback);
        }
    }
}

impl<T, E> std::fmt::Debug for ForeignFuture<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForeignFuture")
            .field("id", &self.core.id)
            .field("route", &self.route)
            .field("resolved", &self.is_resolved())
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

    #[tokio::test]
    async fn value_crosses_threads() {
        let mut event_loop = start_loop();
        let (promise, future) = bind::<u32, String, _>(event_loop.handle(), || {});

        let native = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            promise.complete(42);
        });

        let outcome = tokio::time::timeout(Duration::from_secs(2), future.wait())
            .await
            .expect("wait must resolve");
        assert_eq!(outcome, ForeignOutcome::Value(42));

        native.join().unwrap();
        event_loop.stop().unwrap();
    }

    #[tokio::test]
    async fn native_error_is_delivered() {
        let mut event_loop = start_loop();
        let (promise, future) = bind::<u32, String, _>(event_loop.handle(), || {});

        promise.fail("device unplugged".to_string());
        assert_eq!(
            future.wait().await,
            ForeignOutcome::Error("device unplugged".to_string())
        );

        event_loop.stop().unwrap();
    }

    #[tokio::test]
    async fn dropped_promise_delivers_cancelled() {
        let mut event_loop = start_loop();
        let (promise, future) = bind::<u32, String, _>(event_loop.handle(), || {});

        drop(promise);
        let outcome = tokio::time::timeout(Duration::from_secs(2), future.wait())
            .await
            .expect("a dropped promise must still wake the awaiter");
        assert_eq!(outcome, ForeignOutcome::Cancelled);

        event_loop.stop().unwrap();
    }

    #[tokio::test]
    async fn cancel_runs_the_callback_once() {
        let mut event_loop = start_loop();
        let calls = Arc::new(AtomicU32::new(0));
        let cb_calls = calls.clone();
        let (promise, mut future) =
            bind::<u32, String, _>(event_loop.handle(), move || {
                cb_calls.fetch_add(1, Ordering::SeqCst);
            });

        future.cancel();
        future.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        promise.cancelled();
        assert_eq!(future.wait().await, ForeignOutcome::Cancelled);

        event_loop.stop().unwrap();
    }

    #[tokio::test]
    async fn late_value_after_cancel_is_discarded() {
        let mut event_loop = start_loop();
        let (promise, mut future) = bind::<u32, String, _>(event_loop.handle(), || {});

        future.cancel();
        // Native side raced: it completed instead of acknowledging.
        promise.complete(99);

        assert_eq!(future.wait().await, ForeignOutcome::Cancelled);
        event_loop.stop().unwrap();
    }

    #[tokio::test]
    async fn cancel_after_resolution_is_a_noop() {
        let mut event_loop = start_loop();
        let calls = Arc::new(AtomicU32::new(0));
        let cb_calls = calls.clone();
        let (promise, mut future) =
            bind::<u32, String, _>(event_loop.handle(), move || {
                cb_calls.fetch_add(1, Ordering::SeqCst);
            });

        promise.complete(7);
        future.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(future.wait().await, ForeignOutcome::Value(7));

        event_loop.stop().unwrap();
    }

    #[tokio::test]
    async fn dropping_the_future_cancels_the_native_side() {
        let mut event_loop = start_loop();
        let (cancel_tx, cancel_rx) = std_mpsc::channel::<()>();
        let (promise, future) = bind::<u32, String, _>(event_loop.handle(), move || {
            cancel_tx.send(()).unwrap();
        });

        drop(future);
        cancel_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("dropping the future must fire the cancellation callback");

        promise.cancelled();
        event_loop.stop().unwrap();
    }

    #[test]
    fn loop_local_route_marshals_cancel_onto_the_loop() {
        let mut event_loop = start_loop();
        let handle = event_loop.handle().clone();
        let (bound_tx, bound_rx) = std_mpsc::channel();
        let (cancel_tx, cancel_rx) = std_mpsc::channel::<bool>();

        event_loop
            .handle()
            .schedule(move || {
                let probe = handle.clone();
                let (promise, future) =
                    bind::<u32, String, _>(&handle, move || {
                        cancel_tx.send(probe.is_on_loop_thread()).unwrap();
                    });
                bound_tx.send((promise, future)).unwrap();
            })
            .unwrap();

        let (promise, mut future) = bound_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        // Requested off-loop, but the callback must run on the loop.
        future.cancel();
        let on_loop = cancel_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(on_loop, "loop-local callback must run on the loop thread");

        promise.cancelled();
        event_loop.stop().unwrap();
    }
}
