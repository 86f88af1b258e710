//! Engine data structures

use chat_core::{Config, Message, TurnKey};
use chat_state::SendIntent;

use crate::error::EngineError;

/// Title given to sessions the engine creates on first send.
pub const DEFAULT_SESSION_TITLE: &str = "New chat";

/// Injected settings for a `ChatEngine`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub user_id: String,
    pub default_model: String,
    pub new_session_title: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            user_id: config.user_id.clone(),
            default_model: config.default_model.clone(),
            new_session_title: DEFAULT_SESSION_TITLE.to_string(),
        }
    }
}

/// A send in flight. Created when the optimistic state is applied,
/// destroyed when the response (or failure) has been reconciled.
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub session_id: String,
    pub text: String,
    pub intent: SendIntent,
    /// Turn showing the optimistic reply slot.
    pub turn: TurnKey,
    /// Version index previewed before confirmation. A placeholder only.
    pub optimistic_index: u32,
    /// Id of the empty reply slot appended to the store.
    pub placeholder_id: String,
    /// Local root appended for a new turn; kept visible if the send fails.
    pub optimistic_root: Option<Message>,
    /// Message list as it was before the send.
    pub snapshot: Vec<Message>,
}

impl PendingSend {
    /// Numeric id the reply slot hangs off.
    pub fn parent_ref(&self) -> Option<i64> {
        match &self.intent {
            SendIntent::Retry {
                root_message_id, ..
            } => Some(*root_message_id),
            SendIntent::NewTurn => self.optimistic_root.as_ref().and_then(|m| m.message_id),
        }
    }
}

/// Result of a send that got past validation.
#[derive(Debug)]
pub enum SendOutcome {
    /// Server accepted the send and the store holds the refreshed list.
    Confirmed {
        session_id: String,
        turn: Option<TurnKey>,
        version: Option<usize>,
    },
    /// The send failed; an error reply is shown in the turn.
    Failed {
        session_id: String,
        error: EngineError,
    },
    /// The session was switched before the response arrived; nothing was applied.
    Stale { session_id: String },
}

impl SendOutcome {
    pub fn session_id(&self) -> &str {
        match self {
            SendOutcome::Confirmed { session_id, .. }
            | SendOutcome::Failed { session_id, .. }
            | SendOutcome::Stale { session_id } => session_id,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, SendOutcome::Confirmed { .. })
    }
}
