//! The cooperative event loop and its thread-safe handle.
//!
//! One [`EventLoop`] owns one dedicated worker thread running a
//! single-threaded cooperative executor (tokio current-thread runtime plus
//! a `LocalSet`). Everything that executes "inside the loop" (scoped
//! tasks, submitted calls, foreign-future awaiters) runs on that thread
//! and may therefore hold `!Send` state across await points.
//!
//! # Architecture
//!
//! ```text
//! external threads                 worker thread
//! ┌──────────────┐   schedule()   ┌─────────────────────────────┐
//! │  LoopHandle  │ ─────────────► │  job_rx loop (in LocalSet)  │
//! │  (cloneable) │    job queue   │    ├─► job()                │
//! └──────────────┘                │    │     └─► spawn_local    │
//!        │                        │    └─► Shutdown → drain out │
//!        │ is_on_loop_thread()    └─────────────────────────────┘
//!        ▼
//!   ThreadId compare (O(1))
//! ```
//!
//! # Contract
//!
//! - Scheduled closures run on the loop thread inside the `LocalSet`
//!   context, so they may call `tokio::task::spawn_local`. They must
//!   return quickly: anything long-running is spawned as a task, because a
//!   closure that blocks stalls every other task on the loop.
//! - Startup and shutdown are one-shot. A stopped loop never restarts.
//! - [`EventLoop::stop`] refuses while task scopes are still bound
//!   ([`BridgeError::ResourceStillBound`]), which statically orders
//!   teardown: scopes first, loop last.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, ThreadId};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::BridgeError;

/// Lifecycle state of an event loop.
///
/// Transitions: `Starting → Running → Stopped`. No transitions out of
/// `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Worker thread exists, executor not yet accepting work.
    Starting,
    /// Loop is processing scheduled jobs.
    Running,
    /// Loop has exited; all further scheduling fails.
    Stopped,
}

impl LoopState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Starting,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

/// Configuration for starting an event loop.
///
/// The Rust rendition of the "loop kind" knob: which flavour of loop to
/// host is fixed (tokio current-thread), what varies is its identity.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Name given to the worker thread (shows up in logs and panics).
    pub thread_name: String,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            thread_name: "weft-loop".to_string(),
        }
    }
}

enum LoopJob {
    Run(Box<dyn FnOnce() + Send>),
    Shutdown,
}

struct HandleShared {
    thread_id: ThreadId,
    job_tx: mpsc::UnboundedSender<LoopJob>,
    state: Arc<AtomicU8>,
    /// Live `TaskScope` count, for `ResourceStillBound` enforcement.
    scopes: AtomicUsize,
}

/// Thread-safe, cloneable reference to a running event loop.
///
/// Every other bridge component holds one of these; none of them own the
/// loop. The owning [`EventLoop`] must outlive all handles' *use* (a handle
/// used after `stop()` fails with [`BridgeError::RuntimeStopped`], it does
/// not dangle).
#[derive(Clone)]
pub struct LoopHandle {
    shared: Arc<HandleShared>,
}

impl LoopHandle {
    /// Returns whether the calling thread is the loop's worker thread.
    ///
    /// O(1); every component uses this to pick the zero-hop path over the
    /// cross-thread path.
    #[must_use]
    pub fn is_on_loop_thread(&self) -> bool {
        thread::current().id() == self.shared.thread_id
    }

    /// Returns the loop's lifecycle state.
    #[must_use]
    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Enqueues a closure to run on the loop thread at the next
    /// opportunity.
    ///
    /// Thread-safe and never blocks the caller. The closure runs inside
    /// the loop's `LocalSet` context and may `spawn_local`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::RuntimeStopped`] if the loop has already stopped.
    /// Note the unavoidable shutdown race: a job accepted just before the
    /// loop drains may be dropped unrun. Components that must resolve a
    /// waiter arm a drop guard inside the closure's captures for exactly
    /// this case.
    pub fn schedule<F>(&self, job: F) -> Result<(), BridgeError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.state() == LoopState::Stopped {
            return Err(BridgeError::RuntimeStopped);
        }
        self.shared
            .job_tx
            .send(LoopJob::Run(Box::new(job)))
            .map_err(|_| BridgeError::RuntimeStopped)
    }

    /// Registers a newly entered task scope.
    pub(crate) fn register_scope(&self) {
        self.shared.scopes.fetch_add(1, Ordering::AcqRel);
    }

    /// Releases a torn-down task scope.
    pub(crate) fn release_scope(&self) {
        let prev = self.shared.scopes.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "scope release without register");
    }

    fn live_scopes(&self) -> usize {
        self.shared.scopes.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopHandle")
            .field("thread_id", &self.shared.thread_id)
            .field("state", &self.state())
            .field("scopes", &self.live_scopes())
            .finish()
    }
}

/// An owned, running event loop on a dedicated worker thread.
///
/// Created once with [`start`](EventLoop::start), torn down once with
/// [`stop`](EventLoop::stop) (or on drop, as a last resort).
pub struct EventLoop {
    handle: LoopHandle,
    thread: Option<thread::JoinHandle<()>>,
}

impl EventLoop {
    /// Spawns the worker thread and blocks until the loop accepts work.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Startup`] if the thread or its runtime cannot be
    /// created; [`BridgeError::WorkerPanicked`] if the worker died before
    /// signalling readiness. Startup failures are fatal, never retried.
    pub fn start(config: LoopConfig) -> Result<Self, BridgeError> {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), std::io::Error>>();
        let state = Arc::new(AtomicU8::new(LoopState::Starting as u8));

        let worker_state = state.clone();
        let thread = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || worker_main(job_rx, worker_state, ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(BridgeError::Startup(err));
            }
            Err(_) => {
                // Worker died without reporting: readiness sender dropped.
                let _ = thread.join();
                return Err(BridgeError::WorkerPanicked);
            }
        }

        info!("event loop '{}' started", config.thread_name);

        Ok(Self {
            handle: LoopHandle {
                shared: Arc::new(HandleShared {
                    thread_id: thread.thread().id(),
                    job_tx,
                    state,
                    scopes: AtomicUsize::new(0),
                }),
            },
            thread: Some(thread),
        })
    }

    /// Returns the thread-safe handle to this loop.
    #[must_use]
    pub fn handle(&self) -> &LoopHandle {
        &self.handle
    }

    /// Signals the loop to drain queued jobs and exit, then joins the
    /// worker thread.
    ///
    /// # Errors
    ///
    /// [`BridgeError::ResourceStillBound`] if any task scope is still
    /// live; tear scopes down first. [`BridgeError::WorkerPanicked`] if
    /// the worker thread panicked.
    pub fn stop(&mut self) -> Result<(), BridgeError> {
        let bound = self.handle.live_scopes();
        if bound > 0 {
            return Err(BridgeError::ResourceStillBound(bound));
        }

        let Some(thread) = self.thread.take() else {
            return Err(BridgeError::RuntimeStopped);
        };

        self.handle
            .shared
            .state
            .store(LoopState::Stopped as u8, Ordering::Release);
        // Queued jobs ahead of this marker still run; the queue drains
        // before the loop exits.
        let _ = self.handle.shared.job_tx.send(LoopJob::Shutdown);

        thread.join().map_err(|_| BridgeError::WorkerPanicked)
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let bound = self.handle.live_scopes();
            if bound > 0 {
                warn!(
                    "event loop dropped with {} task scope(s) still bound; forcing shutdown",
                    bound
                );
            }
            self.handle
                .shared
                .state
                .store(LoopState::Stopped as u8, Ordering::Release);
            let _ = self.handle.shared.job_tx.send(LoopJob::Shutdown);
            let _ = thread.join();
        }
    }
}

fn worker_main(
    mut job_rx: mpsc::UnboundedReceiver<LoopJob>,
    state: Arc<AtomicU8>,
    ready_tx: std_mpsc::Sender<Result<(), std::io::Error>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            state.store(LoopState::Stopped as u8, Ordering::Release);
            let _ = ready_tx.send(Err(err));
            return;
        }
    };

    let local = tokio::task::LocalSet::new();
    let loop_state = state.clone();
    runtime.block_on(local.run_until(async move {
        loop_state.store(LoopState::Running as u8, Ordering::Release);
        let _ = ready_tx.send(Ok(()));
        debug!("event loop accepting jobs");

        while let Some(job) = job_rx.recv().await {
            match job {
                LoopJob::Run(f) => f(),
                LoopJob::Shutdown => {
                    debug!("event loop shutdown requested");
                    break;
                }
            }
        }
    }));

    state.store(LoopState::Stopped as u8, Ordering::Release);
    info!("event loop stopped");
}
