//! Core types for the WEFT cross-runtime bridge.
//!
//! WEFT lets a single-threaded cooperative event loop (the "script side")
//! and a multi-threaded native host drive each other through one
//! coordination primitive: future/task handoff with symmetric cancellation.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SDK Layer                               │
//! │  (leaf, SemVer stable, safe for any consumer)                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  weft-types     : ErrorCode, CallId, BindingId    ◄── HERE   │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Bridge Layer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  weft-bridge    : EventLoop, TaskScope, Submitter, foreign  │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Interface Layer                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  weft-ipc       : Commands registry, generate_handler       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! This crate holds the pieces every layer needs and nothing else:
//!
//! - [`ErrorCode`]: unified machine-readable error interface
//! - [`CallId`] / [`BindingId`]: UUID-based identifiers for log correlation

mod error;
mod id;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use id::{BindingId, CallId};
