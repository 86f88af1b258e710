//! Wire decoding - lenient ingestion of backend message payloads
//!
//! The backend is not consistent about identifier types: `id` may arrive as
//! a number or a string, `parent_id` as an integer, a numeric string, or
//! null. Everything is coerced here so the rest of the crate only ever
//! deals with `Option<i64>`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use super::model::{Message, MessageOrigin, Role};

/// An identifier as it appears on the wire.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub(crate) enum WireId {
    Int(i64),
    Float(f64),
    Text(String),
}

impl WireId {
    /// Render the identifier as a client-side string key.
    pub(crate) fn into_key(self) -> String {
        match self {
            WireId::Int(v) => v.to_string(),
            WireId::Float(v) if v.fract() == 0.0 => (v as i64).to_string(),
            WireId::Float(v) => v.to_string(),
            WireId::Text(s) => s,
        }
    }

    /// Coerce to an integer id. Non-numeric strings yield `None`.
    pub(crate) fn to_numeric(&self) -> Option<i64> {
        match self {
            WireId::Int(v) => Some(*v),
            WireId::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            WireId::Float(_) => None,
            WireId::Text(s) => s.trim().parse::<i64>().ok(),
        }
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // Naive timestamps (no offset) are treated as UTC.
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// A message exactly as the backend sends it.
#[derive(Deserialize, Debug)]
pub(crate) struct WireMessage {
    id: WireId,
    #[serde(default)]
    message_id: Option<WireId>,
    #[serde(default)]
    session_id: Option<String>,
    role: Role,
    #[serde(default)]
    content: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    parent_id: Option<WireId>,
    #[serde(default)]
    sibling_index: Option<WireId>,
    #[serde(default)]
    agent_type: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        let id = wire.id.clone().into_key();

        // Fall back to a numeric `id` when `message_id` is absent.
        let message_id = wire
            .message_id
            .as_ref()
            .and_then(WireId::to_numeric)
            .or_else(|| wire.id.to_numeric());

        let parent_id = match &wire.parent_id {
            None => None,
            Some(raw) => {
                let coerced = raw.to_numeric();
                if coerced.is_none() {
                    tracing::warn!(msg_id = %id, parent = ?raw, "non-numeric parent_id treated as absent");
                }
                coerced
            }
        };

        let sibling_index = wire.sibling_index.as_ref().and_then(|raw| {
            let index = raw.to_numeric().and_then(|v| u32::try_from(v).ok());
            if index.is_none() {
                tracing::warn!(msg_id = %id, sibling_index = ?raw, "unusable sibling_index ignored");
            }
            index
        });

        let created_at = match wire.created_at.as_deref() {
            None => DateTime::<Utc>::default(),
            Some(raw) => parse_timestamp(raw).unwrap_or_else(|| {
                tracing::warn!(msg_id = %id, created_at = raw, "unparseable timestamp");
                DateTime::<Utc>::default()
            }),
        };

        Message {
            id,
            message_id,
            session_id: wire.session_id.unwrap_or_default(),
            role: wire.role,
            content: wire.content,
            created_at,
            parent_id,
            sibling_index,
            agent_type: wire.agent_type,
            model: wire.model,
            origin: MessageOrigin::Server,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    fn decode(value: serde_json::Value) -> Message {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_numeric_and_string_ids_normalize() {
        let msg = decode(json!({
            "id": 12,
            "role": "assistant",
            "content": "hi",
            "parent_id": "7",
            "sibling_index": "2"
        }));
        assert_eq!(msg.id, "12");
        assert_eq!(msg.message_id, Some(12));
        assert_eq!(msg.parent_id, Some(7));
        assert_eq!(msg.sibling_index, Some(2));
        assert_eq!(msg.origin, MessageOrigin::Server);
    }

    #[test]
    fn test_non_numeric_parent_is_absent() {
        let msg = decode(json!({
            "id": "abc",
            "role": "assistant",
            "parent_id": "not-a-number"
        }));
        assert_eq!(msg.parent_id, None);
        assert_eq!(msg.message_id, None);
    }

    #[test]
    fn test_negative_sibling_index_ignored() {
        let msg = decode(json!({
            "id": "5",
            "role": "assistant",
            "parent_id": 1,
            "sibling_index": -1
        }));
        assert_eq!(msg.sibling_index, None);
    }

    #[test]
    fn test_naive_timestamp_is_utc() {
        let msg = decode(json!({
            "id": "1",
            "role": "user",
            "created_at": "2024-03-05T10:11:12.123456"
        }));
        assert_eq!(msg.created_at.year(), 2024);
        assert_eq!(msg.created_at.hour(), 10);
    }

    #[test]
    fn test_explicit_message_id_wins() {
        let msg = decode(json!({
            "id": "local-1",
            "message_id": 42,
            "role": "user",
            "parent_id": null
        }));
        assert_eq!(msg.id, "local-1");
        assert_eq!(msg.message_id, Some(42));
        assert!(msg.is_root());
    }
}
