//! chat_core - Core types for the branching chat client
//!
//! This crate provides the foundational types used across all chat crates:
//! - `message` - Message, Role, lenient wire decoding
//! - `session` - Session cache entries
//! - `conversation` - ConversationTree rebuilt from the flat message list
//! - `config` - Client configuration

pub mod config;
pub mod conversation;
pub mod message;
pub mod paths;
pub mod session;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use conversation::{ConversationTree, TreeAnomaly, Turn, TurnKey};
pub use message::{Message, MessageOrigin, Role, ERROR_AGENT_TYPE};
pub use session::Session;
