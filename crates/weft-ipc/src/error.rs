//! Invoke-layer errors.
//!
//! # Error Code Convention
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`InvokeError::CommandNotFound`] | `IPC_COMMAND_NOT_FOUND` | No |
//! | [`InvokeError::InvalidPayload`] | `IPC_INVALID_PAYLOAD` | No |
//! | [`InvokeError::SerializeFailed`] | `IPC_SERIALIZE_FAILED` | No |
//! | [`InvokeError::Handler`] | `IPC_HANDLER_FAILED` | No |
//! | [`InvokeError::BridgeGone`] | `IPC_BRIDGE_GONE` | No |

use serde::Serialize;
use thiserror::Error;
use weft_types::ErrorCode;

/// What went wrong while routing or running one invoke.
///
/// Serializable so hosts can ship it back over their wire as-is. A
/// handler's own domain failure travels as [`Handler`](Self::Handler)
/// with a message the handler chose for the caller's eyes.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "message")]
pub enum InvokeError {
    /// No handler registered under the invoked name.
    #[error("unknown command '{0}'")]
    CommandNotFound(String),

    /// The request payload did not deserialize into the handler's input.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The handler's response did not serialize.
    #[error("response serialization failed: {0}")]
    SerializeFailed(String),

    /// The handler ran and reported a failure to the caller.
    #[error("{0}")]
    Handler(String),

    /// The bridge stopped before the invoke could run.
    #[error("bridge is gone; invoke not processed")]
    BridgeGone,
}

impl InvokeError {
    /// Shorthand for a handler-raised failure.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }
}

impl ErrorCode for InvokeError {
    fn code(&self) -> &'static str {
        match self {
            Self::CommandNotFound(_) => "IPC_COMMAND_NOT_FOUND",
            Self::InvalidPayload(_) => "IPC_INVALID_PAYLOAD",
            Self::SerializeFailed(_) => "IPC_SERIALIZE_FAILED",
            Self::Handler(_) => "IPC_HANDLER_FAILED",
            Self::BridgeGone => "IPC_BRIDGE_GONE",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_types::assert_error_codes;

    #[test]
    fn codes_follow_convention() {
        assert_error_codes(
            &[
                InvokeError::CommandNotFound("x".into()),
                InvokeError::InvalidPayload("bad".into()),
                InvokeError::SerializeFailed("bad".into()),
                InvokeError::handler("nope"),
                InvokeError::BridgeGone,
            ],
            "IPC_",
        );
    }

    #[test]
    fn serializes_with_kind_and_message() {
        let err = InvokeError::CommandNotFound("ping".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "CommandNotFound");
        assert_eq!(json["message"], "ping");
    }
}
