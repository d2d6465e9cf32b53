//! Unified error interface for WEFT.
//!
//! This module provides the [`ErrorCode`] trait for standardized
//! error handling across all WEFT crates.
//!
//! # Design
//!
//! All WEFT error types implement [`ErrorCode`] to provide:
//!
//! - **Machine-readable codes**: for programmatic error handling
//! - **Recoverability info**: for retry logic and caller feedback
//! - **Cancellation marking**: so "I cancelled this" is never confused
//!   with "this broke"
//!
//! The third point is specific to a cancellation bridge: callers routinely
//! cancel in-flight work on purpose, and treating the resulting error like a
//! failure would poison logs and retry logic alike.
//!
//! # Example
//!
//! ```
//! use weft_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Timeout,
//!     Cancelled,
//! }
//!
//! impl ErrorCode for MyError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Timeout => "MY_TIMEOUT",
//!             Self::Cancelled => "MY_CANCELLED",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Timeout)
//!     }
//!
//!     fn is_cancellation(&self) -> bool {
//!         matches!(self, Self::Cancelled)
//!     }
//! }
//!
//! let err = MyError::Cancelled;
//! assert_eq!(err.code(), "MY_CANCELLED");
//! assert!(err.is_cancellation());
//! assert!(!err.is_recoverable());
//! ```

/// Unified error code interface for WEFT errors.
///
/// # Code Format
///
/// Error codes should be:
///
/// - **UPPER_SNAKE_CASE**: e.g. `"BRIDGE_RUNTIME_STOPPED"`
/// - **Namespace-prefixed**: `"BRIDGE_"`, `"CALL_"`, `"IPC_"`
/// - **Stable**: codes do not change once defined (API contract)
///
/// # Recoverability
///
/// An error is recoverable if retrying the operation may succeed (timeouts,
/// transient contention). Programmer errors (wrong teardown order, blocking
/// on the loop thread) and dead-runtime errors are not recoverable.
///
/// # Cancellation
///
/// `is_cancellation` returns `true` only for the variant that reports a
/// deliberately cancelled operation. It defaults to `false`; error types
/// with a cancellation variant must override it.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    ///
    /// UPPER_SNAKE_CASE, prefixed with the owning domain, stable across
    /// versions (changing a code is a breaking change).
    fn code(&self) -> &'static str;

    /// Returns whether retrying the failed operation may succeed.
    fn is_recoverable(&self) -> bool;

    /// Returns whether this error reports a deliberate cancellation
    /// rather than a failure.
    fn is_cancellation(&self) -> bool {
        false
    }
}

/// Validates that an error code follows WEFT conventions.
///
/// # Checks
///
/// 1. Code is not empty
/// 2. Code starts with the expected prefix
/// 3. Code is UPPER_SNAKE_CASE
///
/// # Panics
///
/// Panics with a descriptive message if validation fails. Intended for
/// tests that pin down the code table of an error enum.
///
/// # Example
///
/// ```
/// use weft_types::{assert_error_code, ErrorCode};
///
/// #[derive(Debug)]
/// struct Stopped;
///
/// impl ErrorCode for Stopped {
///     fn code(&self) -> &'static str { "BRIDGE_RUNTIME_STOPPED" }
///     fn is_recoverable(&self) -> bool { false }
/// }
///
/// assert_error_code(&Stopped, "BRIDGE_");
/// ```
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "Error code must not be empty");

    assert!(
        code.starts_with(expected_prefix),
        "Error code '{}' must start with prefix '{}'",
        code,
        expected_prefix
    );

    assert!(
        is_upper_snake_case(code),
        "Error code '{}' must be UPPER_SNAKE_CASE",
        code
    );
}

/// Validates multiple error codes at once.
///
/// Use this to verify all variants of an error enum in one assertion.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

/// Checks if a string is UPPER_SNAKE_CASE.
fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return false;
    }

    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
