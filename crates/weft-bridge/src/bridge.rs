//! The assembled bridge: loop + root scope + submitter, with ordered
//! teardown.
//!
//! [`Bridge`] is the one-call entry point for hosts that do not need
//! custom scope topology: it starts the event loop, opens a root task
//! scope on it, and wires a [`Submitter`] to that scope. Teardown runs in
//! the only order the loop accepts (scope first, loop second), so
//! callers cannot get it wrong.

use tracing::info;

use crate::error::BridgeError;
use crate::event_loop::{EventLoop, LoopConfig, LoopHandle};
use crate::scope::{ScopeHandle, TaskScope};
use crate::submit::Submitter;

/// A running event loop with a root scope and a ready-made submitter.
///
/// Field order matters for the drop-without-shutdown path: the root scope
/// must go down before the loop it is bound to.
pub struct Bridge {
    root: Option<TaskScope>,
    submitter: Submitter,
    event_loop: EventLoop,
}

impl Bridge {
    /// Starts the loop, opens the root scope, and wires the submitter.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Startup`] or [`BridgeError::WorkerPanicked`] if the
    /// worker thread could not be brought up.
    pub fn start(config: LoopConfig) -> Result<Self, BridgeError> {
        let event_loop = EventLoop::start(config)?;
        let root = TaskScope::enter_remote(event_loop.handle())?;
        let submitter = Submitter::new(root.handle());
        info!("bridge started");
        Ok(Self {
            root: Some(root),
            submitter,
            event_loop,
        })
    }

    /// Thread-safe handle to the underlying loop.
    #[must_use]
    pub fn handle(&self) -> &LoopHandle {
        self.event_loop.handle()
    }

    /// Submitter feeding the root scope.
    #[must_use]
    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    /// Thread-safe view of the root scope (cancellation, state).
    #[must_use]
    pub fn root_scope(&self) -> ScopeHandle {
        self.submitter.scope().clone()
    }

    /// Tears everything down in order: cancel and drain the root scope,
    /// then stop and join the loop.
    ///
    /// # Errors
    ///
    /// [`BridgeError::WouldDeadlock`] if called on the loop thread;
    /// [`BridgeError::WorkerPanicked`] if the worker thread panicked.
    pub fn shutdown(mut self) -> Result<(), BridgeError> {
        if let Some(root) = self.root.take() {
            root.close()?;
        }
        self.event_loop.stop()?;
        info!("bridge shut down");
        Ok(())
    }
}
