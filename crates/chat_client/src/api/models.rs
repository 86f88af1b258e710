use chat_core::Message;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateSessionRequest {
    pub user_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: String,
    pub user_id: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub response: String,
    pub session_id: String,
    #[serde(default)]
    pub agent_type: Option<String>,
    /// The new assistant message. Its tree position is not trusted on its
    /// own; callers re-fetch the full list.
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub value: String,
    #[serde(default)]
    pub label: String,
}

/// `GET /config/models`: selectable models and the server's default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalog {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
    #[serde(default)]
    pub default: Option<String>,
}

impl ModelCatalog {
    pub fn contains(&self, value: &str) -> bool {
        self.models.iter().any(|m| m.value == value)
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct UpdateMessageRequest<'a> {
    pub content: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesEnvelope {
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionsEnvelope {
    #[serde(default)]
    pub sessions: Vec<chat_core::Session>,
}
