//! Identifier types for WEFT.
//!
//! Every in-flight handoff gets a UUID so that the two halves of a
//! cross-thread exchange (the submitting side and the loop side, or the
//! native side and the awaiting side) can be correlated in logs without
//! sharing any state beyond the handoff structure itself.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for one submitted cross-thread call.
///
/// Created when a call is submitted to the loop; appears in the tracing
/// output of both the submitting thread and the loop-side supervisor task.
///
/// # Example
///
/// ```
/// use weft_types::CallId;
///
/// let a = CallId::new();
/// let b = CallId::new();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(Uuid);

impl CallId {
    /// Creates a new random call identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form: first segment is enough to correlate log lines.
        let s = self.0.to_string();
        write!(f, "call-{}", &s[..8])
    }
}

/// Identifier for one foreign-future binding.
///
/// Shared between the native promise half and the loop-side future half,
/// so a cancel/complete race can be reconstructed from logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingId(Uuid);

impl BindingId {
    /// Creates a new random binding identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for BindingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0.to_string();
        write!(f, "bind-{}", &s[..8])
    }
}
