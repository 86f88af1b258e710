//! MessageStore - the flat, authoritative message list of the active session
//!
//! Server lists are swapped in wholesale. Optimistic entries are never
//! merged or diffed against server data: the next `replace` drops them.

use std::collections::HashSet;

use chat_core::{ConversationTree, Message, MessageOrigin, Role, TurnKey};

#[derive(Debug, Clone)]
pub struct MessageStore {
    messages: Vec<Message>,
    next_provisional_id: i64,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_provisional_id: -1,
        }
    }

    /// Atomically swap in a fresh server list. Returns how many local
    /// entries were discarded.
    pub fn replace(&mut self, messages: Vec<Message>) -> usize {
        let discarded = self.messages.iter().filter(|m| m.origin.is_local()).count();
        self.messages = messages
            .into_iter()
            .map(|mut m| {
                m.origin = MessageOrigin::Server;
                m
            })
            .collect();
        if discarded > 0 {
            tracing::debug!(discarded, "superseded optimistic messages");
        }
        discarded
    }

    /// Put back a previously captured list as-is, local entries included.
    pub fn restore(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Insert a locally synthesized message ahead of server confirmation.
    pub fn append_optimistic(&mut self, mut message: Message) {
        if message.origin == MessageOrigin::Server {
            message.origin = MessageOrigin::Optimistic;
        }
        self.messages.push(message);
    }

    pub fn current(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn has_optimistic(&self) -> bool {
        self.messages.iter().any(|m| m.origin.is_local())
    }

    /// Rebuild the turn tree from the current list.
    pub fn tree(&self) -> ConversationTree {
        ConversationTree::build(&self.messages)
    }

    /// Next negative id for a local message. Never collides with server ids.
    pub fn allocate_provisional_id(&mut self) -> i64 {
        let id = self.next_provisional_id;
        self.next_provisional_id -= 1;
        id
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Message> {
        let index = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(index))
    }

    /// Swap a local entry (e.g. a pending reply) for another local entry in place.
    pub fn replace_local(&mut self, id: &str, mut message: Message) -> bool {
        let Some(slot) = self
            .messages
            .iter_mut()
            .find(|m| m.id == id && m.origin.is_local())
        else {
            return false;
        };
        if message.origin == MessageOrigin::Server {
            message.origin = MessageOrigin::Optimistic;
        }
        *slot = message;
        true
    }

    /// Drop local replies (pending or failed) hanging off `parent_id`.
    /// Returns how many were removed.
    pub fn remove_local_replies(&mut self, parent_id: i64) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| {
            !(m.origin.is_local() && m.role == Role::Assistant && m.parent_id == Some(parent_id))
        });
        before - self.messages.len()
    }

    /// Drop local roots whose text is exactly `content`, together with
    /// their local replies. Returns how many messages were removed.
    pub fn remove_local_turns(&mut self, content: &str) -> usize {
        let roots: HashSet<i64> = self
            .messages
            .iter()
            .filter(|m| m.origin.is_local() && m.is_root() && m.content == content)
            .filter_map(|m| m.message_id)
            .collect();
        if roots.is_empty() {
            return 0;
        }
        let before = self.messages.len();
        self.messages.retain(|m| {
            let local_root = m.is_root() && m.message_id.is_some_and(|id| roots.contains(&id));
            let local_reply = m.parent_id.is_some_and(|id| roots.contains(&id));
            !(m.origin.is_local() && (local_root || local_reply))
        });
        before - self.messages.len()
    }

    /// Drop the given turn and every turn after it. Returns the removed messages.
    pub fn truncate_from_turn(&mut self, key: &TurnKey) -> Vec<Message> {
        let tree = self.tree();
        let Some(position) = tree.position(key) else {
            return Vec::new();
        };

        let doomed: HashSet<&str> = tree.turns()[position..]
            .iter()
            .flat_map(|turn| {
                let root = (!turn.synthetic_root).then_some(turn.root.id.as_str());
                root.into_iter()
                    .chain(turn.versions.iter().map(|m| m.id.as_str()))
            })
            .collect();

        let (removed, kept): (Vec<Message>, Vec<Message>) = std::mem::take(&mut self.messages)
            .into_iter()
            .partition(|m| doomed.contains(m.id.as_str()));
        self.messages = kept;
        removed
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
