//! State transitions - FSM transition logic
//!
//! Implements the state machine that handles event-driven state transitions.
//! Unlike a permissive FSM, events the table does not cover are rejected so
//! that a second send while one is in flight surfaces as an error.

use thiserror::Error;

use super::events::SendEvent;
use super::states::SendState;

/// Error type for invalid state transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("A send is already in progress for session {session_id}")]
    AlreadySending { session_id: String },

    #[error("Invalid transition from {from:?} with event {event}")]
    InvalidTransition { from: SendState, event: String },
}

/// Represents a state transition result.
#[derive(Debug, Clone)]
pub struct StateTransition {
    /// The state before the transition.
    pub from: SendState,
    /// The state after the transition.
    pub to: SendState,
    /// The event that triggered the transition.
    pub event: SendEvent,
    /// Whether the state actually changed.
    pub changed: bool,
}

/// State machine for the send lifecycle.
#[derive(Debug, Clone)]
pub struct StateMachine {
    /// Current state.
    current_state: SendState,
    /// Transition history (limited).
    history: Vec<StateTransition>,
    /// Max history entries to keep.
    max_history: usize,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Create a new state machine in Idle state.
    pub fn new() -> Self {
        Self::with_state(SendState::Idle)
    }

    /// Create a state machine with a specific initial state.
    pub fn with_state(state: SendState) -> Self {
        Self {
            current_state: state,
            history: Vec::new(),
            max_history: 50,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> &SendState {
        &self.current_state
    }

    /// Get the transition history.
    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Handle an event and transition to a new state.
    pub fn handle_event(&mut self, event: SendEvent) -> Result<StateTransition, TransitionError> {
        let old_state = self.current_state.clone();
        let new_state = self.compute_next_state(&old_state, &event)?;
        let changed = old_state != new_state;

        self.current_state = new_state.clone();

        let transition = StateTransition {
            from: old_state,
            to: new_state,
            event,
            changed,
        };

        tracing::debug!(
            from = ?transition.from,
            to = ?transition.to,
            event = transition.event.name(),
            "send state transition"
        );

        // Add to history
        self.history.push(transition.clone());
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }

        Ok(transition)
    }

    /// Compute the next state given current state and event.
    fn compute_next_state(
        &self,
        state: &SendState,
        event: &SendEvent,
    ) -> Result<SendState, TransitionError> {
        use SendEvent::*;
        use SendState::*;

        let next = match (state, event) {
            // ========== Idle Transitions ==========
            (Idle, SendRequested { session_id, retry }) => Sending {
                session_id: session_id.clone(),
                retry: *retry,
            },

            // ========== In Flight ==========
            (Sending { session_id, .. }, SendRequested { .. }) => {
                return Err(TransitionError::AlreadySending {
                    session_id: session_id.clone(),
                })
            }
            (Sending { .. }, ResponseReceived) => Confirmed,
            (Sending { .. }, SendErrored { error }) => Failed {
                error_message: error.clone(),
                failed_at: chrono::Utc::now().to_rfc3339(),
            },

            // ========== Settling ==========
            (Confirmed, Settled) => Idle,
            (Failed { .. }, Settled) => Idle,

            // ========== Session Switch ==========
            (_, SessionSwitched) => Idle,

            _ => {
                return Err(TransitionError::InvalidTransition {
                    from: state.clone(),
                    event: event.name().to_string(),
                })
            }
        };
        Ok(next)
    }

    /// Check if a transition is valid without executing it.
    pub fn can_transition(&self, event: &SendEvent) -> bool {
        self.compute_next_state(&self.current_state, event).is_ok()
    }

    /// Reset to Idle state.
    pub fn reset(&mut self) {
        self.current_state = SendState::Idle;
    }
}
