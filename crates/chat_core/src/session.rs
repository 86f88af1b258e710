//! Session - backend-owned conversation container
//!
//! The client only holds a read-mostly cache of these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{parse_timestamp, WireId};

/// A chat session as listed by the backend.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(from = "WireSession")]
pub struct Session {
    pub id: String,
    pub title: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub message_count: u32,
    pub is_starred: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Session {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            created_at: None,
            updated_at: None,
            message_count: 0,
            is_starred: false,
            project_id: None,
            user_id: None,
        }
    }
}

/// Session payload as sent by the backend, which uses `id`, `session_id`, or both.
#[derive(Deserialize, Debug)]
struct WireSession {
    #[serde(default)]
    id: Option<WireId>,
    #[serde(default)]
    session_id: Option<WireId>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    message_count: Option<u32>,
    #[serde(default)]
    is_starred: Option<bool>,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

impl From<WireSession> for Session {
    fn from(wire: WireSession) -> Self {
        let id = wire
            .session_id
            .or(wire.id)
            .map(WireId::into_key)
            .unwrap_or_default();
        Self {
            id,
            title: wire.title.unwrap_or_default(),
            created_at: wire.created_at.as_deref().and_then(parse_timestamp),
            updated_at: wire.updated_at.as_deref().and_then(parse_timestamp),
            message_count: wire.message_count.unwrap_or(0),
            is_starred: wire.is_starred.unwrap_or(false),
            project_id: wire.project_id,
            user_id: wire.user_id,
        }
    }
}
