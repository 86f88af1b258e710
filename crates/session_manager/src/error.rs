//! Engine error types

use chat_core::TurnKey;
use chat_state::TransitionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to create session: {0}")]
    SessionCreateFailed(String),

    #[error("Failed to send message: {0}")]
    SendFailed(String),

    #[error("Failed to fetch messages: {0}")]
    FetchMessagesFailed(String),

    #[error("Failed to fetch sessions: {0}")]
    FetchSessionsFailed(String),

    #[error("Failed to fetch models: {0}")]
    FetchModelsFailed(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("A send is already in progress for session {0}")]
    SendInProgress(String),

    #[error("Message text is empty")]
    EmptyInput,

    #[error("Turn not found: {0}")]
    TurnNotFound(TurnKey),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("No active session")]
    NoActiveSession,

    #[error("Failed to update message: {0}")]
    UpdateFailed(String),

    #[error(transparent)]
    Transition(TransitionError),
}

impl From<TransitionError> for EngineError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::AlreadySending { session_id } => EngineError::SendInProgress(session_id),
            other => EngineError::Transition(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
