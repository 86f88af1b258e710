//! Read-only projections of engine state for rendering

use chat_client::ModelInfo;
use chat_core::{ConversationTree, Message, Session, Turn, TurnKey};
use chat_state::{SendState, VersionSelector};
use serde::Serialize;

/// Everything a presentation layer needs to draw the active session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineSnapshot {
    pub session_id: Option<String>,
    pub state: SendState,
    pub turns: Vec<TurnView>,
    pub notice: Option<String>,
    pub sessions: Vec<Session>,
    /// Last fetched model catalogue; empty until fetched.
    pub models: Vec<ModelInfo>,
    /// Structural problems seen while building the tree.
    pub anomalies: usize,
}

impl EngineSnapshot {
    pub fn turn(&self, key: &TurnKey) -> Option<&TurnView> {
        self.turns.iter().find(|t| &t.key == key)
    }

    pub fn last_turn(&self) -> Option<&TurnView> {
        self.turns.last()
    }

    pub fn is_sending(&self) -> bool {
        self.state.is_sending()
    }
}

/// One turn with the reply version currently selected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnView {
    pub key: TurnKey,
    pub prompt: String,
    pub synthetic: bool,
    pub selected: Option<usize>,
    pub version_count: usize,
    pub reply: Option<ReplyView>,
}

impl TurnView {
    /// "2/3" style label, or None when there is nothing to page through.
    pub fn version_label(&self) -> Option<String> {
        let selected = self.selected?;
        (self.version_count > 1).then(|| format!("{}/{}", selected + 1, self.version_count))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyView {
    pub message_id: String,
    pub content: String,
    pub agent_type: Option<String>,
    pub model: Option<String>,
    pub pending: bool,
    pub error: bool,
}

impl From<&Message> for ReplyView {
    fn from(message: &Message) -> Self {
        Self {
            message_id: message.id.clone(),
            content: message.content.clone(),
            agent_type: message.agent_type.clone(),
            model: message.model.clone(),
            pending: message.is_pending(),
            error: message.is_error(),
        }
    }
}

pub(crate) fn turn_view(turn: &Turn, selector: &VersionSelector) -> TurnView {
    let version_count = turn.version_count();
    let selected = selector.get(&turn.key, version_count);
    TurnView {
        key: turn.key.clone(),
        prompt: turn.prompt().to_string(),
        synthetic: turn.synthetic_root,
        selected,
        version_count,
        reply: selected.and_then(|i| turn.version(i)).map(ReplyView::from),
    }
}

pub(crate) fn turn_views(tree: &ConversationTree, selector: &VersionSelector) -> Vec<TurnView> {
    tree.turns()
        .iter()
        .map(|turn| turn_view(turn, selector))
        .collect()
}
