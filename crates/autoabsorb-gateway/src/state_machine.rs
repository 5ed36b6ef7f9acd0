//! Reader state machine implementation.
//!
//! This module tracks the operational state of the absorbance reader and
//! rejects any transition the instrument lifecycle does not allow.
//!
//! # States
//!
//! - `Disconnected`: No link to the instrument (initial state)
//! - `Ready`: Connected and idle; instrument commands are admitted
//! - `Busy`: One instrument operation is in flight
//! - `Calibrating`: The instrument is recalibrating
//! - `Error`: A fatal failure occurred; waits for reset or reconnect
//!
//! # Valid Transitions
//!
//! - Disconnected → Ready
//! - Ready → Busy → Ready
//! - Ready → Calibrating → Ready
//! - Ready/Busy/Calibrating → Error
//! - Ready → Disconnected
//! - Error → Disconnected/Ready
//!
//! # Examples
//!
//! ```
//! use autoabsorb_core::DeviceState;
//! use autoabsorb_gateway::StateMachine;
//!
//! let mut machine = StateMachine::new();
//! assert_eq!(machine.current_state(), DeviceState::Disconnected);
//!
//! machine.transition_to(DeviceState::Ready, "connected").unwrap();
//! assert!(machine.transition_to(DeviceState::Calibrating, "calibrate").is_ok());
//!
//! // Busy is only reachable from Ready
//! assert!(machine.transition_to(DeviceState::Busy, "read").is_err());
//! ```

use std::collections::VecDeque;

use autoabsorb_core::{DeviceState, Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Maximum number of state transitions to keep in history.
///
/// A plate read costs two transitions (Ready → Busy → Ready), so this holds
/// roughly the last hundred instrument operations.
pub const MAX_HISTORY_SIZE: usize = 200;

/// Returns `true` if the reader may move from `from` to `to`.
#[must_use]
pub fn can_transition(from: DeviceState, to: DeviceState) -> bool {
    use DeviceState as S;

    matches!(
        (from, to),
        (S::Disconnected, S::Ready)
            | (S::Ready, S::Busy)
            | (S::Ready, S::Calibrating)
            | (S::Ready, S::Disconnected)
            | (S::Ready, S::Error)
            | (S::Busy, S::Ready)
            | (S::Busy, S::Error)
            | (S::Calibrating, S::Ready)
            | (S::Calibrating, S::Error)
            | (S::Error, S::Disconnected)
            | (S::Error, S::Ready)
    )
}

/// Record of one state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateTransition {
    /// State before the transition.
    pub from: DeviceState,

    /// State after the transition.
    pub to: DeviceState,

    /// What caused the change (operation name or failure message).
    pub reason: String,

    /// Wall-clock time of the change.
    pub at: DateTime<Utc>,
}

impl StateTransition {
    pub fn new(from: DeviceState, to: DeviceState, reason: impl Into<String>) -> Self {
        Self {
            from,
            to,
            reason: reason.into(),
            at: Utc::now(),
        }
    }
}

/// State machine for the reader lifecycle.
///
/// # Thread Safety
///
/// This struct is not synchronized. The gateway shares it through
/// [`StateHandle`](crate::state::StateHandle), which adds locking and change
/// notification.
#[derive(Debug)]
pub struct StateMachine {
    /// Current state of the reader.
    current_state: DeviceState,

    /// History of state transitions (limited to MAX_HISTORY_SIZE).
    history: VecDeque<StateTransition>,
}

impl StateMachine {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self {
            current_state: DeviceState::Disconnected,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    /// Create a builder for restoring a machine to a given state.
    ///
    /// # Examples
    ///
    /// ```
    /// use autoabsorb_core::DeviceState;
    /// use autoabsorb_gateway::StateMachine;
    ///
    /// let machine = StateMachine::builder()
    ///     .with_initial_state(DeviceState::Ready)
    ///     .build();
    ///
    /// assert_eq!(machine.current_state(), DeviceState::Ready);
    /// ```
    pub fn builder() -> StateMachineBuilder {
        StateMachineBuilder::default()
    }

    /// Get the current state of the machine.
    #[must_use]
    pub fn current_state(&self) -> DeviceState {
        self.current_state
    }

    /// Transition history, ordered from oldest to newest.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Get the last N state transitions, oldest first.
    pub fn last_transitions(&self, count: usize) -> Vec<StateTransition> {
        self.history
            .iter()
            .rev()
            .take(count)
            .rev()
            .cloned()
            .collect()
    }

    /// Transition to a new state, validating the transition.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` if the lifecycle does not
    /// allow moving from the current state to `new_state`. The machine is
    /// left unchanged.
    pub fn transition_to(
        &mut self,
        new_state: DeviceState,
        reason: impl Into<String>,
    ) -> Result<StateTransition> {
        if !can_transition(self.current_state, new_state) {
            return Err(Error::InvalidStateTransition {
                from: self.current_state.to_string(),
                to: new_state.to_string(),
            });
        }

        let transition = StateTransition::new(self.current_state, new_state, reason);
        self.perform_state_change(new_state, transition.clone());
        Ok(transition)
    }

    /// Force the machine back to Disconnected regardless of current state.
    ///
    /// Used when the link is torn down unconditionally (shutdown).
    pub fn reset(&mut self, reason: impl Into<String>) -> StateTransition {
        let transition =
            StateTransition::new(self.current_state, DeviceState::Disconnected, reason);
        self.perform_state_change(DeviceState::Disconnected, transition.clone());
        transition
    }

    fn perform_state_change(&mut self, new_state: DeviceState, transition: StateTransition) {
        self.current_state = new_state;
        self.add_to_history(transition);
    }

    fn add_to_history(&mut self, transition: StateTransition) {
        self.history.push_back(transition);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for constructing `StateMachine` instances.
#[derive(Debug, Default)]
pub struct StateMachineBuilder {
    initial_state: Option<DeviceState>,
    history: Vec<StateTransition>,
}

impl StateMachineBuilder {
    /// Set the initial state (defaults to Disconnected).
    pub fn with_initial_state(mut self, state: DeviceState) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Pre-populate the history. Only the newest `MAX_HISTORY_SIZE`
    /// entries are kept.
    pub fn with_history(mut self, history: Vec<StateTransition>) -> Self {
        self.history = history;
        self
    }

    pub fn build(self) -> StateMachine {
        let mut machine = StateMachine::new();
        if let Some(state) = self.initial_state {
            machine.current_state = state;
        }
        for transition in self.history {
            machine.add_to_history(transition);
        }
        machine
    }
}
