//! Bridge layer errors.
//!
//! Two error families live here, matching the two lifetimes in the system:
//!
//! - [`BridgeError`]: loop-level failures (startup, shutdown, wrong-thread
//!   usage). These are one-shot and never retried automatically.
//! - [`CallError`]: per-call outcomes for a single submitted or converted
//!   operation. The wrapped work's own failures are *not* represented here:
//!   they travel verbatim inside the call's value type (use
//!   `T = Result<V, E>`), so the original error type survives the round
//!   trip. `CallError` only reports what the bridge itself did to the call.
//!
//! # Error Code Convention
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`BridgeError::Startup`] | `BRIDGE_STARTUP_FAILED` | No |
//! | [`BridgeError::RuntimeStopped`] | `BRIDGE_RUNTIME_STOPPED` | No |
//! | [`BridgeError::ResourceStillBound`] | `BRIDGE_RESOURCE_STILL_BOUND` | No |
//! | [`BridgeError::NotOnLoopThread`] | `BRIDGE_NOT_ON_LOOP_THREAD` | No |
//! | [`BridgeError::ScopeClosed`] | `BRIDGE_SCOPE_CLOSED` | No |
//! | [`BridgeError::WouldDeadlock`] | `BRIDGE_WOULD_DEADLOCK` | No |
//! | [`BridgeError::WorkerPanicked`] | `BRIDGE_WORKER_PANICKED` | No |
//! | [`CallError::Cancelled`] | `CALL_CANCELLED` | No (cancellation) |
//! | [`CallError::Panicked`] | `CALL_PANICKED` | No |
//! | [`CallError::LoopStopped`] | `CALL_LOOP_STOPPED` | No |
//! | [`CallError::WaitTimeout`] | `CALL_WAIT_TIMEOUT` | Yes |
//! | [`CallError::WouldDeadlock`] | `CALL_WOULD_DEADLOCK` | No |
//! | [`CallError::AlreadyConsumed`] | `CALL_ALREADY_CONSUMED` | No |
//!
//! # Cancelled vs Failed
//!
//! [`CallError::Cancelled`] is the only variant with
//! `is_cancellation() == true`. Callers that cancel work on purpose match on
//! it (or on `is_cancellation()`) to avoid treating their own cancellation
//! as a defect:
//!
//! ```
//! use weft_bridge::CallError;
//! use weft_types::ErrorCode;
//!
//! fn report(err: &CallError) {
//!     if err.is_cancellation() {
//!         // expected: we asked for this
//!     } else {
//!         eprintln!("[{}] call failed: {}", err.code(), err);
//!     }
//! }
//!
//! report(&CallError::Cancelled);
//! ```

use thiserror::Error;
use weft_types::ErrorCode;

/// Loop-level bridge failures.
///
/// All variants are fatal to the attempted operation; none are retried
/// automatically. `ResourceStillBound`, `NotOnLoopThread`, `ScopeClosed`
/// and `WouldDeadlock` are programmer errors (wrong ordering or wrong
/// thread), surfaced instead of silently tolerated.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The worker thread or its runtime could not be created.
    #[error("event loop startup failed: {0}")]
    Startup(#[from] std::io::Error),

    /// The loop has already stopped; no further work is accepted.
    #[error("event loop has stopped")]
    RuntimeStopped,

    /// `stop()` was called while task scopes are still live.
    #[error("cannot stop event loop: {0} task scope(s) still bound")]
    ResourceStillBound(usize),

    /// A loop-thread-only operation was invoked from another thread.
    #[error("operation requires the loop thread")]
    NotOnLoopThread,

    /// A spawn was attempted on a scope that is closing or closed.
    #[error("task scope is closed")]
    ScopeClosed,

    /// A blocking wait was attempted on the loop thread itself.
    #[error("blocking on the loop thread would deadlock")]
    WouldDeadlock,

    /// The worker thread panicked; the loop is unusable.
    #[error("event loop worker thread panicked")]
    WorkerPanicked,
}

impl ErrorCode for BridgeError {
    fn code(&self) -> &'static str {
        match self {
            Self::Startup(_) => "BRIDGE_STARTUP_FAILED",
            Self::RuntimeStopped => "BRIDGE_RUNTIME_STOPPED",
            Self::ResourceStillBound(_) => "BRIDGE_RESOURCE_STILL_BOUND",
            Self::NotOnLoopThread => "BRIDGE_NOT_ON_LOOP_THREAD",
            Self::ScopeClosed => "BRIDGE_SCOPE_CLOSED",
            Self::WouldDeadlock => "BRIDGE_WOULD_DEADLOCK",
            Self::WorkerPanicked => "BRIDGE_WORKER_PANICKED",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Per-call outcome errors for one submitted or converted operation.
///
/// Exactly one of these (or the call's value) reaches the caller: the
/// result cell behind a call is write-once, so a call can never report
/// both a value and a `CallError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The call was cancelled (by its handle, its scope, or teardown)
    /// before producing a result. Distinct from failure by design.
    #[error("call was cancelled")]
    Cancelled,

    /// The call's future (or blocking closure) panicked.
    #[error("call panicked: {0}")]
    Panicked(String),

    /// The loop stopped before the call could run.
    #[error("event loop stopped before the call ran")]
    LoopStopped,

    /// A bounded `result(timeout)` wait elapsed. The call may still be
    /// running; the handle remains usable.
    #[error("timed out waiting for the call result")]
    WaitTimeout,

    /// A blocking result wait was attempted on the loop thread.
    #[error("waiting for a call result on the loop thread would deadlock")]
    WouldDeadlock,

    /// The result was already taken by an earlier wait.
    #[error("call result was already consumed")]
    AlreadyConsumed,
}

impl ErrorCode for CallError {
    fn code(&self) -> &'static str {
        match self {
            Self::Cancelled => "CALL_CANCELLED",
            Self::Panicked(_) => "CALL_PANICKED",
            Self::LoopStopped => "CALL_LOOP_STOPPED",
            Self::WaitTimeout => "CALL_WAIT_TIMEOUT",
            Self::WouldDeadlock => "CALL_WOULD_DEADLOCK",
            Self::AlreadyConsumed => "CALL_ALREADY_CONSUMED",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::WaitTimeout)
    }

    fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_types::assert_error_codes;

    #[test]
    fn bridge_error_codes_follow_convention() {
        assert_error_codes(
            &[
                BridgeError::Startup(std::io::Error::other("boom")),
                BridgeError::RuntimeStopped,
                BridgeError::ResourceStillBound(2),
                BridgeError::NotOnLoopThread,
                BridgeError::ScopeClosed,
                BridgeError::WouldDeadlock,
                BridgeError::WorkerPanicked,
            ],
            "BRIDGE_",
        );
    }

    #[test]
    fn call_error_codes_follow_convention() {
        assert_error_codes(
            &[
                CallError::Cancelled,
                CallError::Panicked("p".into()),
                CallError::LoopStopped,
                CallError::WaitTimeout,
                CallError::WouldDeadlock,
                CallError::AlreadyConsumed,
            ],
            "CALL_",
        );
    }

    #[test]
    fn only_cancelled_is_cancellation() {
        assert!(CallError::Cancelled.is_cancellation());
        assert!(!CallError::Panicked("p".into()).is_cancellation());
        assert!(!CallError::LoopStopped.is_cancellation());
        assert!(!BridgeError::RuntimeStopped.is_cancellation());
    }

    #[test]
    fn only_wait_timeout_is_recoverable() {
        assert!(CallError::WaitTimeout.is_recoverable());
        assert!(!CallError::Cancelled.is_recoverable());
        assert!(!BridgeError::WouldDeadlock.is_recoverable());
    }
}
