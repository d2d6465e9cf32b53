//! Routing invokes from host threads onto the loop.
//!
//! An [`InvokeHandler`] is the glue a host hangs its transport on: any
//! thread builds an [`Invoke`] (command name, JSON payload, one-shot
//! responder) and hands it over. The handler submits a detached call per
//! invoke, so dispatch and handler execution happen on the loop thread
//! while the host thread returns immediately.
//!
//! The responder always settles for a processed invoke. If the bridge is
//! torn down around an in-flight invoke, the responder is dropped instead:
//! a `RecvError` on the caller's receiver means the bridge died, not that
//! the handler failed.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use weft_bridge::{LoopState, Submitter};

use crate::commands::Commands;
use crate::error::InvokeError;

/// One command invocation travelling from a host thread to the loop.
#[derive(Debug)]
pub struct Invoke {
    /// Registered command name to route to.
    pub command: String,
    /// Request payload, already in JSON form.
    pub payload: Value,
    /// Where the outcome goes; dropped (never sent) only if the bridge
    /// goes down mid-flight.
    pub responder: oneshot::Sender<Result<Value, InvokeError>>,
}

impl Invoke {
    /// Builds an invoke plus the receiver for its response.
    #[must_use]
    pub fn new(
        command: impl Into<String>,
        payload: Value,
    ) -> (Self, oneshot::Receiver<Result<Value, InvokeError>>) {
        let (responder, response_rx) = oneshot::channel();
        (
            Self {
                command: command.into(),
                payload,
                responder,
            },
            response_rx,
        )
    }
}

/// Thread-safe entry point turning [`Invoke`]s into loop-side dispatches.
///
/// Cheap to clone; clones share the registry and the submitter.
#[derive(Clone)]
pub struct InvokeHandler {
    submitter: Submitter,
    commands: Arc<Commands>,
}

impl InvokeHandler {
    /// Wires a registry to the submitter whose scope will run the
    /// handlers.
    #[must_use]
    pub fn new(submitter: Submitter, commands: Arc<Commands>) -> Self {
        Self {
            submitter,
            commands,
        }
    }

    /// Returns the shared command registry.
    #[must_use]
    pub fn commands(&self) -> &Arc<Commands> {
        &self.commands
    }

    /// Accepts one invoke and returns immediately; the response arrives
    /// on the invoke's responder once the handler has run.
    ///
    /// An invoke against a stopped bridge is answered right away with
    /// [`InvokeError::BridgeGone`].
    pub fn handle(&self, invoke: Invoke) {
        if self.submitter.loop_handle().state() == LoopState::Stopped {
            let _ = invoke.responder.send(Err(InvokeError::BridgeGone));
            return;
        }

        let commands = self.commands.clone();
        self.submitter
            .submit(move || async move {
                let result = commands.dispatch(&invoke.command, invoke.payload).await;
                if invoke.responder.send(result).is_err() {
                    debug!(
                        "response for command '{}' dropped; caller went away",
                        invoke.command
                    );
                }
            })
            .detach();
    }
}

impl std::fmt::Debug for InvokeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvokeHandler")
            .field("commands", &self.commands)
            .finish()
    }
}
