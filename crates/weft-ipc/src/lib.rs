//! weft-ipc: command registry and invoke routing over the weft bridge.
//!
//! Hosts expose async command handlers to their native side through three
//! pieces:
//!
//! | Piece | Role |
//! |-------|------|
//! | [`Commands`] | name → async handler registry (typed or raw JSON) |
//! | [`Invoke`] | one request: command, payload, one-shot responder |
//! | [`InvokeHandler`] | thread-safe dispatch of invokes onto the loop |
//!
//! ```text
//! host thread                       loop thread
//! ┌───────────────┐   handle()    ┌──────────────────────────┐
//! │ Invoke::new   │ ────────────► │ Commands::dispatch       │
//! │ await rx      │ ◄──────────── │   └─► registered handler │
//! └───────────────┘   responder   └──────────────────────────┘
//! ```
//!
//! Handlers run on the loop thread and may therefore hold `!Send` state
//! across await points; payloads and responses cross threads as
//! `serde_json::Value`.

pub mod commands;
pub mod error;
pub mod handler;

pub use commands::Commands;
pub use error::InvokeError;
pub use handler::{Invoke, InvokeHandler};
