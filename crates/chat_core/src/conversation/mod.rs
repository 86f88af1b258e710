//! Conversation module - turn tree derived from the flat message list
//!
//! Each user root is a turn; every assistant reply to that root is one
//! version of the answer.

mod tree;
mod turn;

pub use tree::{ConversationTree, TreeAnomaly};
pub use turn::{Turn, TurnKey};
