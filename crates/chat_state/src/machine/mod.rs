//! State machine module
//!
//! Contains the FSM for the lifecycle of a single send.

mod events;
mod states;
mod transitions;

pub use events::SendEvent;
pub use states::SendState;
pub use transitions::{StateMachine, StateTransition, TransitionError};
