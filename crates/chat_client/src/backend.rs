use async_trait::async_trait;
use chat_core::{Message, Session};

use crate::api::models::{ChatRequest, ChatResponse, CreateSessionRequest, ModelCatalog};
use crate::error::Result;

/// The REST operations the chat client consumes.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `POST /sessions`
    async fn create_session(&self, request: CreateSessionRequest) -> Result<Session>;

    /// `GET /sessions?user_id=..`
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>>;

    /// `GET /sessions/{id}/messages` - the flat, authoritative list.
    async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>>;

    /// `POST /chat`
    async fn send_chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// `GET /config/models`
    async fn list_models(&self) -> Result<ModelCatalog>;

    /// `PUT /messages/{id}` - content correction without regenerating.
    async fn update_message(&self, message_id: &str, content: &str) -> Result<()>;
}
