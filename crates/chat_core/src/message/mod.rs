//! Message module - Chat message types
//!
//! Shared message types used across the system. Wire decoding is lenient
//! about identifier types; everything downstream sees one integer id type.

mod model;
mod wire;

pub use model::{Message, MessageOrigin, Role, ERROR_AGENT_TYPE};
pub(crate) use wire::{parse_timestamp, WireId};
