//! chat_state - Client-side state for a branching chat session
//!
//! This crate provides the pieces the reconciliation engine composes:
//! - `machine` - Idle / Sending / Confirmed / Failed lifecycle of a send
//! - `store` - the canonical flat message list plus optimistic entries
//! - `selection` - which reply version of each turn is displayed
//! - `retry` - new turn vs. retry of an existing turn

pub mod machine;
pub mod retry;
pub mod selection;
pub mod store;

// Re-export commonly used types
pub use machine::{SendEvent, SendState, StateMachine, StateTransition, TransitionError};
pub use retry::{classify, SendIntent};
pub use selection::{Direction, VersionSelector};
pub use store::MessageStore;
