//! Converters across the sync/async boundary.
//!
//! Two directions, one rule each way:
//!
//! - [`run_blocking`] / [`run_blocking_with_stop`]: awaited *inside* the
//!   loop, runs a blocking closure off-thread so the loop keeps turning.
//! - [`block_on_call`]: called *outside* the loop, submits an async call
//!   and blocks the calling thread for its result.
//!
//! Using either from the wrong side is refused, not deadlocked:
//! [`block_on_call`] on the loop thread reports
//! [`CallError::WouldDeadlock`] immediately.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::CallError;
use crate::event_loop::LoopHandle;
use crate::foreign::{self, ForeignOutcome};
use crate::submit::{panic_text, Submitter};

/// Cooperative stop request for a blocking closure.
///
/// Set when the awaiting side cancels; the closure polls it at its own
/// checkpoints and returns early. A closure that never checks simply runs
/// to completion into a discarded result: cancellation of blocking work
/// is cooperative or nothing.
#[derive(Debug, Clone)]
pub struct StopFlag {
    flag: Arc<AtomicBool>,
}

impl StopFlag {
    fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    fn set(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns whether the awaiting side has asked the closure to stop.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Runs a blocking closure off the loop thread and awaits its result.
///
/// Must be awaited from inside the loop's runtime (a scoped task or a
/// submitted call). If the awaiting task is cancelled, the closure's
/// result is discarded but the closure itself runs to completion; use
/// [`run_blocking_with_stop`] when it can be told to stop early.
///
/// # Errors
///
/// [`CallError::Panicked`] if the closure panicked,
/// [`CallError::Cancelled`] if the awaiting side was cancelled first.
pub async fn run_blocking<F, T>(handle: &LoopHandle, f: F) -> Result<T, CallError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    run_blocking_with_stop(handle, move |_stop| f()).await
}

/// Like [`run_blocking`], but hands the closure a [`StopFlag`] that is set
/// if the awaiting side cancels, so long-running blocking work can bail
/// out at its own checkpoints.
pub async fn run_blocking_with_stop<F, T>(handle: &LoopHandle, f: F) -> Result<T, CallError>
where
    F: FnOnce(&StopFlag) -> T + Send + 'static,
    T: Send + 'static,
{
    let stop = StopFlag::new();
    let worker_stop = stop.clone();
    let (promise, future) = foreign::bind::<T, String, _>(handle, move || stop.set());

    tokio::task::spawn_blocking(move || {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&worker_stop)));
        match result {
            Ok(value) => promise.complete(value),
            Err(payload) => promise.fail(panic_text(payload)),
        }
    });

    match future.wait().await {
        ForeignOutcome::Value(value) => Ok(value),
        ForeignOutcome::Error(message) => Err(CallError::Panicked(message)),
        ForeignOutcome::Cancelled => Err(CallError::Cancelled),
    }
}

/// Submits an async call and blocks the calling thread for its outcome.
///
/// The sync-caller entry point: external code that has no runtime of its
/// own uses this to call into the loop.
///
/// # Errors
///
/// [`CallError::WouldDeadlock`] if called on the loop thread itself;
/// otherwise whatever the call resolved to.
pub fn block_on_call<F, Fut, T>(submitter: &Submitter, factory: F) -> Result<T, CallError>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = T> + 'static,
    T: Send + 'static,
{
    if submitter.loop_handle().is_on_loop_thread() {
        return Err(CallError::WouldDeadlock);
    }
    submitter.submit(factory).result(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::{EventLoop, LoopConfig};
    use crate::scope::TaskScope;
    use std::time::Duration;

    fn setup() -> (EventLoop, TaskScope, Submitter) {
        let event_loop = EventLoop::start(LoopConfig::default()).expect("loop must start");
        let scope = TaskScope::enter_remote(event_loop.handle()).expect("scope must open");
        let submitter = Submitter::new(scope.handle());
        (event_loop, scope, submitter)
    }

    fn teardown(mut event_loop: EventLoop, scope: TaskScope) {
        scope.close().expect("scope close");
        event_loop.stop().expect("loop stop");
    }

    #[test]
    fn run_blocking_returns_the_value() {
        let (event_loop, scope, submitter) = setup();
        let handle = event_loop.handle().clone();

        let call = submitter.submit(move || async move {
            run_blocking(&handle, || {
                std::thread::sleep(Duration::from_millis(20));
                6 * 7
            })
            .await
        });
        assert_eq!(call.result(Some(Duration::from_secs(2))), Ok(Ok(42)));

        teardown(event_loop, scope);
    }

    #[test]
    fn run_blocking_does_not_stall_the_loop() {
        let (event_loop, scope, submitter) = setup();
        let handle = event_loop.handle().clone();

        let slow = submitter.submit(move || async move {
            run_blocking(&handle, || {
                std::thread::sleep(Duration::from_millis(200));
                1u32
            })
            .await
        });
        // While the blocking closure sleeps, the loop still serves calls.
        let quick = submitter.submit(|| async { 2u32 });
        assert_eq!(quick.result(Some(Duration::from_millis(100))), Ok(2));
        assert_eq!(slow.result(Some(Duration::from_secs(2))), Ok(Ok(1)));

        teardown(event_loop, scope);
    }

    #[test]
    fn run_blocking_maps_a_panic() {
        let (event_loop, scope, submitter) = setup();
        let handle = event_loop.handle().clone();

        let call = submitter.submit(move || async move {
            run_blocking(&handle, || -> u32 { panic!("disk on fire") }).await
        });
        let outcome = call.result(Some(Duration::from_secs(2))).unwrap();
        assert!(
            matches!(outcome, Err(CallError::Panicked(msg)) if msg.contains("disk on fire"))
        );

        teardown(event_loop, scope);
    }

    #[test]
    fn cancelling_the_call_sets_the_stop_flag() {
        let (event_loop, scope, submitter) = setup();
        let handle = event_loop.handle().clone();
        let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();
        let (stopped_tx, stopped_rx) = std::sync::mpsc::channel::<()>();

        let call = submitter.submit(move || async move {
            run_blocking_with_stop(&handle, move |stop| {
                started_tx.send(()).unwrap();
                while !stop.is_set() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                stopped_tx.send(()).unwrap();
            })
            .await
        });

        started_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        call.cancel();

        // The call reports cancellation...
        assert_eq!(
            call.result(Some(Duration::from_secs(2))),
            Err(CallError::Cancelled)
        );
        // ...and the blocking worker observed the stop request.
        stopped_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("stop flag must reach the blocking closure");

        teardown(event_loop, scope);
    }

    #[test]
    fn block_on_call_round_trips() {
        let (event_loop, scope, submitter) = setup();

        let result = block_on_call(&submitter, || async { "pong".to_string() });
        assert_eq!(result, Ok("pong".to_string()));

        teardown(event_loop, scope);
    }

    #[test]
    fn block_on_call_refuses_the_loop_thread() {
        let (event_loop, scope, submitter) = setup();

        let inner = submitter.clone();
        let call = submitter.submit(move || async move {
            block_on_call(&inner, || async { 1u32 })
        });
        assert_eq!(
            call.result(Some(Duration::from_secs(2))),
            Ok(Err(CallError::WouldDeadlock))
        );

        teardown(event_loop, scope);
    }
}
