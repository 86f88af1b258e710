//! Send states - Defines all possible states of the send lifecycle

use serde::{Deserialize, Serialize};

/// Lifecycle of one send: `Idle -> Sending -> {Confirmed | Failed} -> Idle`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SendState {
    /// No turn is pending; a new send may begin.
    #[default]
    Idle,

    /// A send is in flight for `session_id`.
    Sending {
        session_id: String,
        /// The send attaches a new version to an existing turn.
        retry: bool,
    },

    /// The server accepted the send; local state is being refreshed.
    Confirmed,

    /// The send failed; an error reply is being surfaced.
    Failed {
        error_message: String,
        failed_at: String, // ISO timestamp
    },
}

impl SendState {
    /// Check if this state allows a new send.
    pub fn accepts_user_input(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_sending(&self) -> bool {
        matches!(self, Self::Sending { .. })
    }

    /// Session the in-flight send belongs to.
    pub fn sending_session(&self) -> Option<&str> {
        match self {
            Self::Sending { session_id, .. } => Some(session_id),
            _ => None,
        }
    }

    /// Get a human-readable description of the current state.
    pub fn description(&self) -> &str {
        match self {
            Self::Idle => "Ready for input",
            Self::Sending { retry: true, .. } => "Regenerating response",
            Self::Sending { .. } => "Waiting for response",
            Self::Confirmed => "Syncing messages",
            Self::Failed { .. } => "Failed",
        }
    }
}
