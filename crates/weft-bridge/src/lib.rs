//! weft-bridge: a cross-runtime future bridge.
//!
//! Hosts a single-threaded cooperative event loop on a dedicated worker
//! thread and lets native threads interact with it safely: submit calls,
//! await their results, cancel them, and adapt native promises into
//! loop-awaitable futures, with symmetric, once-only cancellation in
//! both directions.
//!
//! # Components
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                         Bridge                             │
//! │  ┌───────────┐  ┌───────────┐  ┌────────────────────────┐  │
//! │  │ EventLoop │◄─│ TaskScope │◄─│       Submitter        │  │
//! │  │ (worker   │  │ (tracked, │  │ (any thread → loop)    │  │
//! │  │  thread)  │  │ cancelab.)│  └────────────────────────┘  │
//! │  └───────────┘  └───────────┘                              │
//! │        ▲                                                   │
//! │        │ foreign::bind      convert::{run_blocking, …}     │
//! │   native promises           sync ↔ async adapters          │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! | Component | Role |
//! |-----------|------|
//! | [`EventLoop`] / [`LoopHandle`] | owns the worker thread; schedules closures onto it |
//! | [`TaskScope`] / [`ScopeHandle`] | structured concurrency: no task outlives its scope |
//! | [`Submitter`] / [`CallHandle`] | cross-thread call submission with waitable results |
//! | [`foreign`] | native promise ↔ loop future adaptation |
//! | [`convert`] | blocking-in-async and async-in-blocking converters |
//! | [`Bridge`] | the assembled facade with ordered teardown |
//!
//! # Guarantees
//!
//! - Every submitted call and every foreign binding resolves its waiter
//!   exactly once, whatever goes wrong in between.
//! - Cancellation is symmetric and idempotent, and once requested it wins
//!   over a concurrently arriving result.
//! - Teardown is ordered: scopes drain before the loop stops, and the
//!   loop refuses to stop while a scope is still bound.

pub mod bridge;
pub mod cancel;
mod cell;
pub mod convert;
pub mod error;
pub mod event_loop;
pub mod foreign;
pub mod scope;
pub mod submit;

pub use bridge::Bridge;
pub use cancel::CancelToken;
pub use convert::{block_on_call, run_blocking, run_blocking_with_stop, StopFlag};
pub use error::{BridgeError, CallError};
pub use event_loop::{EventLoop, LoopConfig, LoopHandle, LoopState};
pub use foreign::{bind, ForeignFuture, ForeignOutcome, ForeignPromise};
pub use scope::{ScopeHandle, ScopeState, TaskScope};
pub use submit::{CallHandle, Submitter};
