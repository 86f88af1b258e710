//! Send events - Defines events that trigger state transitions

use serde::{Deserialize, Serialize};

/// Defines the events that can trigger state transitions in the FSM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendEvent {
    /// User submitted input (new turn or retry).
    SendRequested { session_id: String, retry: bool },

    /// Backend accepted the send.
    ResponseReceived,

    /// Transport error or non-2xx response.
    SendErrored { error: String },

    /// The confirmed or failed outcome has been applied to local state.
    Settled,

    /// Active session changed; whatever was in flight no longer belongs here.
    SessionSwitched,
}

impl SendEvent {
    /// Check if this event is user-initiated.
    pub fn is_user_event(&self) -> bool {
        matches!(self, Self::SendRequested { .. } | Self::SessionSwitched)
    }

    /// Check if this is an error event.
    pub fn is_error_event(&self) -> bool {
        matches!(self, Self::SendErrored { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SendRequested { .. } => "send_requested",
            Self::ResponseReceived => "response_received",
            Self::SendErrored { .. } => "send_errored",
            Self::Settled => "settled",
            Self::SessionSwitched => "session_switched",
        }
    }
}
