//! Turn - one root message and its reply versions

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::message::Message;

const ORPHAN_PREFIX: &str = "orphan:";

/// Identity of a turn: the root message's client id.
///
/// Turns built around an orphaned reply use a synthetic `orphan:<reply id>` key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TurnKey(String);

impl TurnKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub(crate) fn for_root(root: &Message) -> Self {
        Self(root.id.clone())
    }

    pub(crate) fn for_orphan(reply: &Message) -> Self {
        Self(format!("{}{}", ORPHAN_PREFIX, reply.id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_synthetic(&self) -> bool {
        self.0.starts_with(ORPHAN_PREFIX)
    }
}

impl fmt::Display for TurnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TurnKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// A root message plus its ordered reply versions.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Turn {
    pub key: TurnKey,
    pub root: Message,
    pub versions: Vec<Message>,
    /// The root was fabricated to hold an orphaned reply.
    pub synthetic_root: bool,
}

impl Turn {
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    pub fn version(&self, index: usize) -> Option<&Message> {
        self.versions.get(index)
    }

    pub fn latest(&self) -> Option<&Message> {
        self.versions.last()
    }

    /// Index of the newest version, if any.
    pub fn latest_index(&self) -> Option<usize> {
        self.versions.len().checked_sub(1)
    }

    /// Numeric id replies use to reference this turn's root.
    pub fn root_ref(&self) -> Option<i64> {
        if self.synthetic_root {
            return None;
        }
        self.root.message_id
    }

    pub fn prompt(&self) -> &str {
        &self.root.content
    }

    pub fn has_pending(&self) -> bool {
        self.versions.iter().any(Message::is_pending)
    }
}
