pub mod api;
pub mod backend;
pub mod error;
pub mod utils;

pub use api::client::HttpChatBackend;
pub use api::models::{ChatRequest, ChatResponse, CreateSessionRequest, ModelCatalog, ModelInfo};
pub use backend::ChatBackend;
pub use error::ApiError;
