//! ConversationTree - rebuilds turns from the flat, order-agnostic message list
//!
//! Pure function over the list: it never mutates its input and always
//! produces the same structure for the same list. Malformed input degrades
//! instead of failing; every irregularity is recorded as a [`TreeAnomaly`].

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::turn::{Turn, TurnKey};
use crate::message::{Message, Role};

/// Irregularity found while rebuilding the tree.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeAnomaly {
    /// Reply whose parent is not a root in the list. Kept under a synthetic root.
    OrphanReply { message_id: String, parent_id: i64 },
    /// Assistant message without a parent. Kept under a synthetic root.
    UnparentedReply { message_id: String },
    /// User message carrying a parent reference. Treated as a root.
    ParentedUserMessage { message_id: String, parent_id: i64 },
    /// Two roots claim the same numeric id. Replies go to the first.
    DuplicateRootId { message_id: String, root_id: i64 },
    /// Sibling indices missing or colliding; replies ordered by creation time.
    SiblingIndexFallback { parent_id: i64 },
}

/// Ordered turns of one session.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct ConversationTree {
    turns: Vec<Turn>,
    anomalies: Vec<TreeAnomaly>,
}

enum Slot {
    Root { position: usize },
    Orphan { position: usize },
}

impl ConversationTree {
    /// Rebuild the tree from the flat message list.
    ///
    /// Roots keep their order in the list. Replies are grouped under the root
    /// whose numeric id matches their `parent_id`, ordered by `sibling_index`.
    pub fn build(messages: &[Message]) -> Self {
        let mut anomalies = Vec::new();

        // Roots first, so replies listed before their root still attach.
        let mut root_slots: HashMap<i64, usize> = HashMap::new();
        for (position, msg) in messages.iter().enumerate() {
            if msg.role != Role::User {
                continue;
            }
            if let Some(parent_id) = msg.parent_id {
                anomalies.push(TreeAnomaly::ParentedUserMessage {
                    message_id: msg.id.clone(),
                    parent_id,
                });
            }
            if let Some(root_id) = msg.message_id {
                if root_slots.contains_key(&root_id) {
                    anomalies.push(TreeAnomaly::DuplicateRootId {
                        message_id: msg.id.clone(),
                        root_id,
                    });
                } else {
                    root_slots.insert(root_id, position);
                }
            }
        }

        let mut slots = Vec::new();
        let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
        for (position, msg) in messages.iter().enumerate() {
            match msg.role {
                Role::User => slots.push(Slot::Root { position }),
                Role::Assistant => match msg.parent_id {
                    Some(parent_id) => match root_slots.get(&parent_id) {
                        Some(root_position) => {
                            groups.entry(*root_position).or_default().push(position)
                        }
                        None => {
                            anomalies.push(TreeAnomaly::OrphanReply {
                                message_id: msg.id.clone(),
                                parent_id,
                            });
                            slots.push(Slot::Orphan { position });
                        }
                    },
                    None => {
                        anomalies.push(TreeAnomaly::UnparentedReply {
                            message_id: msg.id.clone(),
                        });
                        slots.push(Slot::Orphan { position });
                    }
                },
            }
        }

        let turns = slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Root { position } => {
                    let root = &messages[position];
                    let replies = groups.remove(&position).unwrap_or_default();
                    let versions = order_versions(messages, replies, root, &mut anomalies);
                    Turn {
                        key: TurnKey::for_root(root),
                        root: root.clone(),
                        versions,
                        synthetic_root: false,
                    }
                }
                Slot::Orphan { position } => synthetic_turn(&messages[position]),
            })
            .collect();

        for anomaly in &anomalies {
            tracing::warn!(?anomaly, "malformed conversation tree");
        }

        Self { turns, anomalies }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn anomalies(&self) -> &[TreeAnomaly] {
        &self.anomalies
    }

    pub fn turn(&self, key: &TurnKey) -> Option<&Turn> {
        self.turns.iter().find(|t| &t.key == key)
    }

    pub fn position(&self, key: &TurnKey) -> Option<usize> {
        self.turns.iter().position(|t| &t.key == key)
    }

    /// Turn whose root carries the given numeric id.
    pub fn turn_by_root_id(&self, root_id: i64) -> Option<&Turn> {
        self.turns.iter().find(|t| t.root_ref() == Some(root_id))
    }

    /// Most recent non-synthetic turn whose prompt is exactly `content`.
    pub fn latest_root_with_content(&self, content: &str) -> Option<&Turn> {
        self.turns
            .iter()
            .rev()
            .find(|t| !t.synthetic_root && t.root.content == content)
    }

    pub fn keys(&self) -> HashSet<TurnKey> {
        self.turns.iter().map(|t| t.key.clone()).collect()
    }
}

fn order_versions(
    messages: &[Message],
    mut replies: Vec<usize>,
    root: &Message,
    anomalies: &mut Vec<TreeAnomaly>,
) -> Vec<Message> {
    let mut seen = HashSet::new();
    let well_indexed = replies.iter().all(|&p| match messages[p].sibling_index {
        Some(index) => seen.insert(index),
        None => false,
    });

    if well_indexed {
        replies.sort_by_key(|&p| messages[p].sibling_index);
    } else {
        if let Some(parent_id) = root.message_id {
            anomalies.push(TreeAnomaly::SiblingIndexFallback { parent_id });
        }
        // Position breaks timestamp ties so the order stays deterministic.
        replies.sort_by(|&a, &b| {
            messages[a]
                .created_at
                .cmp(&messages[b].created_at)
                .then(a.cmp(&b))
        });
    }

    replies.into_iter().map(|p| messages[p].clone()).collect()
}

fn synthetic_turn(reply: &Message) -> Turn {
    let root = Message {
        id: TurnKey::for_orphan(reply).to_string(),
        message_id: None,
        session_id: reply.session_id.clone(),
        role: Role::User,
        content: String::new(),
        created_at: reply.created_at,
        parent_id: None,
        sibling_index: None,
        agent_type: None,
        model: None,
        origin: reply.origin,
    };
    Turn {
        key: TurnKey::for_orphan(reply),
        root,
        versions: vec![reply.clone()],
        synthetic_root: true,
    }
}
