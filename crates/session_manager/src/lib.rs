//! # Session Manager
//!
//! Owns the active chat session on the client: the message store, the
//! version selection, and the send lifecycle. Every server round-trip ends
//! in a full refresh of the message list, so the client never drifts from
//! server truth.

pub mod engine;
pub mod error;
pub mod structs;
pub mod view;

// Re-exports
pub use engine::ChatEngine;
pub use error::EngineError;
pub use structs::{EngineSettings, PendingSend, SendOutcome};
pub use view::{EngineSnapshot, ReplyView, TurnView};
