//! The command registry.
//!
//! A [`Commands`] maps command names to async handlers. Registration
//! happens once at startup (builder-style, `&mut self`); after that the
//! registry is shared immutably behind an `Arc` and dispatched against
//! from the loop thread. Handler futures may hold `!Send` state (they
//! are created and polled on the loop), but the handler functions
//! themselves cross threads inside the `Arc` and must be `Send + Sync`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::InvokeError;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, InvokeError>>>>;
type BoxedHandler = Box<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Name → handler registry for invokable commands.
#[derive(Default)]
pub struct Commands {
    handlers: HashMap<String, BoxedHandler>,
}

impl Commands {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a raw handler working directly on JSON values.
    ///
    /// Re-registering a name replaces the previous handler; last one
    /// wins, reported at debug level.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, InvokeError>> + 'static,
    {
        let name = name.into();
        let previous = self.handlers.insert(
            name.clone(),
            Box::new(move |payload| Box::pin(handler(payload)) as HandlerFuture),
        );
        if previous.is_some() {
            debug!("command '{}' re-registered; previous handler replaced", name);
        }
        self
    }

    /// Registers a typed handler: the payload is deserialized into `Req`
    /// and the response serialized from `Resp`, with conversion failures
    /// reported as [`InvokeError::InvalidPayload`] /
    /// [`InvokeError::SerializeFailed`].
    pub fn register_typed<Req, Resp, F, Fut>(
        &mut self,
        name: impl Into<String>,
        handler: F,
    ) -> &mut Self
    where
        Req: DeserializeOwned + 'static,
        Resp: Serialize + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, InvokeError>> + 'static,
    {
        self.register(name, move |payload| {
            let request = serde_json::from_value::<Req>(payload)
                .map_err(|e| InvokeError::InvalidPayload(e.to_string()));
            let fut = request.map(|req| handler(req));
            async move {
                let response = fut?.await?;
                serde_json::to_value(response)
                    .map_err(|e| InvokeError::SerializeFailed(e.to_string()))
            }
        })
    }

    /// Returns whether a handler is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Returns the registered command names, unordered.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Routes one invoke to its handler.
    ///
    /// # Errors
    ///
    /// [`InvokeError::CommandNotFound`] for an unregistered name, plus
    /// whatever the handler itself reports.
    pub async fn dispatch(&self, command: &str, payload: Value) -> Result<Value, InvokeError> {
        let Some(handler) = self.handlers.get(command) else {
            return Err(InvokeError::CommandNotFound(command.to_string()));
        };
        handler(payload).await
    }
}

impl std::fmt::Debug for Commands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("Commands").field("names", &names).finish()
    }
}

/// Builds a [`Commands`] registry from plain async functions, each
/// registered under its own name.
///
/// ```
/// use weft_ipc::{generate_handler, InvokeError};
///
/// async fn ping(payload: String) -> Result<String, InvokeError> {
///     Ok(format!("pong: {payload}"))
/// }
///
/// let commands = generate_handler![ping];
/// assert!(commands.contains("ping"));
/// ```
#[macro_export]
macro_rules! generate_handler {
    ($($command:ident),* $(,)?) => {{
        let mut commands = $crate::Commands::new();
        $( commands.register_typed(stringify!($command), $command); )*
        commands
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct AddRequest {
        a: i64,
        b: i64,
    }

    #[derive(Serialize)]
    struct AddResponse {
        sum: i64,
    }

    async fn add(req: AddRequest) -> Result<AddResponse, InvokeError> {
        Ok(AddResponse { sum: req.a + req.b })
    }

    #[tokio::test]
    async fn typed_handler_round_trips() {
        let mut commands = Commands::new();
        commands.register_typed("add", add);

        let response = commands
            .dispatch("add", json!({"a": 40, "b": 2}))
            .await
            .unwrap();
        assert_eq!(response, json!({"sum": 42}));
    }

    #[tokio::test]
    async fn unknown_command_is_reported() {
        let commands = Commands::new();
        let err = commands.dispatch("nope", json!(null)).await.unwrap_err();
        assert_eq!(err, InvokeError::CommandNotFound("nope".to_string()));
    }

    #[tokio::test]
    async fn bad_payload_is_reported_before_the_handler_runs() {
        let mut commands = Commands::new();
        commands.register_typed("add", add);

        let err = commands
            .dispatch("add", json!({"a": "not a number"}))
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn handler_failures_pass_through() {
        let mut commands = Commands::new();
        commands.register_typed("fail", |(): ()| async {
            Err::<(), _>(InvokeError::handler("not allowed"))
        });

        let err = commands.dispatch("fail", json!(null)).await.unwrap_err();
        assert_eq!(err, InvokeError::Handler("not allowed".to_string()));
    }

    #[tokio::test]
    async fn re_registration_replaces_the_handler() {
        let mut commands = Commands::new();
        commands.register_typed("version", |(): ()| async { Ok(1u32) });
        commands.register_typed("version", |(): ()| async { Ok(2u32) });

        let response = commands.dispatch("version", json!(null)).await.unwrap();
        assert_eq!(response, json!(2));
    }

    #[tokio::test]
    async fn macro_registers_each_function_by_name() {
        async fn ping(payload: String) -> Result<String, InvokeError> {
            Ok(format!("pong: {payload}"))
        }
        async fn echo(payload: Value) -> Result<Value, InvokeError> {
            Ok(payload)
        }

        let commands = generate_handler![ping, echo];
        assert!(commands.contains("ping"));
        assert!(commands.contains("echo"));

        let response = commands.dispatch("ping", json!("hi")).await.unwrap();
        assert_eq!(response, json!("pong: hi"));
    }
}
