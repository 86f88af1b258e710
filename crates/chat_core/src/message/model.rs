//! Message model - one node of the conversation tree
//!
//! A root user message has no `parent_id`; an assistant reply carries the
//! root's numeric id in `parent_id` and its position among sibling replies
//! in `sibling_index`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::wire::WireMessage;

/// `agent_type` value marking a locally synthesized error reply.
pub const ERROR_AGENT_TYPE: &str = "error";

/// Author of a message.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// Where a message came from. Never serialized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MessageOrigin {
    /// Part of the authoritative server list.
    #[default]
    Server,
    /// Synthesized locally ahead of server confirmation.
    Optimistic,
    /// Synthesized locally to surface a failed send.
    LocalError,
}

impl MessageOrigin {
    pub fn is_local(self) -> bool {
        !matches!(self, MessageOrigin::Server)
    }
}

/// A single chat message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(from = "WireMessage")]
pub struct Message {
    /// Client-side identifier. For server messages this is the server id as a string.
    pub id: String,

    /// Numeric identifier. Server-assigned ids are positive; local messages
    /// carry a negative provisional id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i64>,

    pub session_id: String,

    pub role: Role,

    pub content: String,

    pub created_at: DateTime<Utc>,

    /// Numeric id of the root this reply belongs to (None for roots).
    pub parent_id: Option<i64>,

    /// 0-based position among replies sharing `parent_id`.
    pub sibling_index: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip)]
    pub origin: MessageOrigin,
}

impl Message {
    fn base(id: String, message_id: Option<i64>, role: Role, content: String) -> Self {
        Self {
            id,
            message_id,
            session_id: String::new(),
            role,
            content,
            created_at: Utc::now(),
            parent_id: None,
            sibling_index: None,
            agent_type: None,
            model: None,
            origin: MessageOrigin::Server,
        }
    }

    /// A server root (user) message.
    pub fn root(message_id: i64, content: impl Into<String>) -> Self {
        Self::base(
            message_id.to_string(),
            Some(message_id),
            Role::User,
            content.into(),
        )
    }

    /// A server reply (assistant) message.
    pub fn reply(
        message_id: i64,
        parent_id: i64,
        sibling_index: u32,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::base(
            message_id.to_string(),
            Some(message_id),
            Role::Assistant,
            content.into(),
        );
        msg.parent_id = Some(parent_id);
        msg.sibling_index = Some(sibling_index);
        msg
    }

    fn local_id(provisional_id: i64) -> String {
        format!("local{}", provisional_id)
    }

    /// The just-sent user turn, shown before the server confirms it.
    pub fn optimistic_user(
        session_id: impl Into<String>,
        provisional_id: i64,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::base(
            Self::local_id(provisional_id),
            Some(provisional_id),
            Role::User,
            content.into(),
        );
        msg.session_id = session_id.into();
        msg.origin = MessageOrigin::Optimistic;
        msg
    }

    /// Empty reply slot shown while a send is in flight.
    pub fn pending_reply(
        session_id: impl Into<String>,
        provisional_id: i64,
        parent_id: i64,
        sibling_index: u32,
        model: Option<String>,
    ) -> Self {
        let mut msg = Self::base(
            Self::local_id(provisional_id),
            Some(provisional_id),
            Role::Assistant,
            String::new(),
        );
        msg.session_id = session_id.into();
        msg.parent_id = Some(parent_id);
        msg.sibling_index = Some(sibling_index);
        msg.model = model;
        msg.origin = MessageOrigin::Optimistic;
        msg
    }

    /// Local-only reply carrying a failure description.
    pub fn error_reply(
        session_id: impl Into<String>,
        provisional_id: i64,
        parent_id: i64,
        sibling_index: u32,
        description: &str,
    ) -> Self {
        let mut msg = Self::base(
            Self::local_id(provisional_id),
            Some(provisional_id),
            Role::Assistant,
            format!("Sorry, something went wrong: {}", description),
        );
        msg.session_id = session_id.into();
        msg.parent_id = Some(parent_id);
        msg.sibling_index = Some(sibling_index);
        msg.agent_type = Some(ERROR_AGENT_TYPE.to_string());
        msg.origin = MessageOrigin::LocalError;
        msg
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// A user message with no parent.
    pub fn is_root(&self) -> bool {
        self.role == Role::User && self.parent_id.is_none()
    }

    /// Optimistic reply slot still waiting for content.
    pub fn is_pending(&self) -> bool {
        self.origin == MessageOrigin::Optimistic
            && self.role == Role::Assistant
            && self.content.is_empty()
    }

    pub fn is_error(&self) -> bool {
        self.origin == MessageOrigin::LocalError
            || self.agent_type.as_deref() == Some(ERROR_AGENT_TYPE)
    }

    /// Server-assigned id, if this message is server-confirmed.
    pub fn server_id(&self) -> Option<i64> {
        match self.origin {
            MessageOrigin::Server => self.message_id.filter(|id| *id > 0),
            _ => None,
        }
    }
}
