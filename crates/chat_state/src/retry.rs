//! Retry classification - new turn or another version of an existing turn
//!
//! Existing roots are searched most recent first for an exact content
//! match. Only server-confirmed roots qualify; a local root has nothing on
//! the server to attach a version to.

use chat_core::{Message, Role, TurnKey};

/// What a send will do to the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendIntent {
    /// Creates a new root turn.
    NewTurn,
    /// Appends a version under an existing root.
    Retry {
        turn: TurnKey,
        root_message_id: i64,
        /// Index the new reply will occupy (current reply count).
        prospective_index: u32,
    },
}

impl SendIntent {
    pub fn is_retry(&self) -> bool {
        matches!(self, SendIntent::Retry { .. })
    }
}

/// Classify `text` against the current flat message list.
pub fn classify(text: &str, messages: &[Message]) -> SendIntent {
    let target = messages
        .iter()
        .rev()
        .filter(|m| m.is_root())
        .find_map(|m| m.server_id().filter(|_| m.content == text).map(|id| (m, id)));

    let Some((root, root_id)) = target else {
        return SendIntent::NewTurn;
    };

    let reply_count = messages
        .iter()
        .filter(|m| m.role == Role::Assistant && !m.origin.is_local())
        .filter(|m| m.parent_id == Some(root_id))
        .count();

    SendIntent::Retry {
        turn: TurnKey::new(root.id.clone()),
        root_message_id: root_id,
        prospective_index: u32::try_from(reply_count).unwrap_or(u32::MAX),
    }
}
