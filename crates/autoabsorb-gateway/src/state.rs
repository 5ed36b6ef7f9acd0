//! Shared, observable reader state.
//!
//! [`StateHandle`] wraps the [`StateMachine`] so the command gateway and
//! assay runs can share it. Every state change is published on a
//! `tokio::sync::watch` channel, which lets an assay tick wait for the
//! reader to become Ready without polling.
//!
//! The Busy gate is [`StateHandle::try_begin`]: it atomically moves
//! Ready → Busy and hands back a [`BusyGuard`]. Dropping the guard returns
//! the reader to Ready unless something moved it elsewhere in the meantime
//! (a fatal failure moves Busy → Error, and Error must stick).

use std::sync::Arc;

use autoabsorb_core::{DeviceState, Result};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::state_machine::{StateMachine, StateTransition};

#[derive(Debug)]
struct Shared {
    machine: Mutex<StateMachine>,
    changes: watch::Sender<DeviceState>,
}

/// Cloneable handle to the reader's state machine.
#[derive(Debug, Clone)]
pub struct StateHandle {
    shared: Arc<Shared>,
}

impl Default for StateHandle {
    fn default() -> Self {
        Self::new(StateMachine::new())
    }
}

impl StateHandle {
    pub fn new(machine: StateMachine) -> Self {
        let (changes, _) = watch::channel(machine.current_state());
        Self {
            shared: Arc::new(Shared {
                machine: Mutex::new(machine),
                changes,
            }),
        }
    }

    /// Current reader state.
    #[must_use]
    pub fn current(&self) -> DeviceState {
        self.shared.machine.lock().current_state()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<DeviceState> {
        self.shared.changes.subscribe()
    }

    /// The most recent `count` transitions, oldest first.
    pub fn history(&self, count: usize) -> Vec<StateTransition> {
        self.shared.machine.lock().last_transitions(count)
    }

    /// Validated transition.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` when the move is not allowed.
    pub fn transition(&self, to: DeviceState, reason: &str) -> Result<StateTransition> {
        let transition = {
            let mut machine = self.shared.machine.lock();
            machine.transition_to(to, reason)?
        };
        debug!("Reader state {} -> {} ({})", transition.from, transition.to, reason);
        self.shared.changes.send_replace(to);
        Ok(transition)
    }

    /// Move to `to` only if the reader is currently in `from`.
    ///
    /// Returns `None` when the reader was elsewhere.
    pub fn transition_from(
        &self,
        from: DeviceState,
        to: DeviceState,
        reason: &str,
    ) -> Option<StateTransition> {
        let transition = {
            let mut machine = self.shared.machine.lock();
            if machine.current_state() != from {
                return None;
            }
            machine.transition_to(to, reason).ok()?
        };
        debug!("Reader state {} -> {} ({})", transition.from, transition.to, reason);
        self.shared.changes.send_replace(to);
        Some(transition)
    }

    /// Record a fatal failure: any connected state moves to Error.
    ///
    /// Does nothing when the reader is Disconnected or already in Error.
    pub fn fail(&self, reason: &str) -> Option<StateTransition> {
        let transition = {
            let mut machine = self.shared.machine.lock();
            if !machine.current_state().is_connected() {
                return None;
            }
            machine.transition_to(DeviceState::Error, reason).ok()?
        };
        warn!("Reader entered Error state: {}", reason);
        self.shared.changes.send_replace(DeviceState::Error);
        Some(transition)
    }

    /// Unconditionally return to Disconnected.
    pub fn force_disconnected(&self, reason: &str) -> StateTransition {
        let transition = self.shared.machine.lock().reset(reason);
        self.shared.changes.send_replace(DeviceState::Disconnected);
        transition
    }

    /// Claim the reader for one operation (Ready → Busy).
    ///
    /// # Errors
    ///
    /// Returns the current state when it is not Ready.
    pub fn try_begin(&self, operation: &str) -> std::result::Result<BusyGuard, DeviceState> {
        {
            let mut machine = self.shared.machine.lock();
            let state = machine.current_state();
            if !state.admits_commands() {
                return Err(state);
            }
            machine
                .transition_to(DeviceState::Busy, operation)
                .map_err(|_| state)?;
        }
        self.shared.changes.send_replace(DeviceState::Busy);
        Ok(BusyGuard {
            state: self.clone(),
            operation: operation.to_string(),
        })
    }

    /// Wait until the reader is Ready, then claim it.
    ///
    /// Busy and Calibrating are waited out. Returns `Ok(None)` if `cancel`
    /// fires first.
    ///
    /// # Errors
    ///
    /// Returns the state when the reader is Disconnected or in Error, since
    /// neither resolves on its own.
    pub async fn begin_when_ready(
        &self,
        operation: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<Option<BusyGuard>, DeviceState> {
        let mut changes = self.subscribe();

        loop {
            match self.try_begin(operation) {
                Ok(guard) => return Ok(Some(guard)),
                Err(state @ (DeviceState::Disconnected | DeviceState::Error)) => {
                    return Err(state);
                }
                Err(_) => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                changed = changes.changed() => {
                    if changed.is_err() {
                        return Err(self.current());
                    }
                }
            }
        }
    }
}

/// Exclusive claim on the reader for one operation.
///
/// Returns the reader to Ready on drop if it is still Busy.
#[derive(Debug)]
pub struct BusyGuard {
    state: StateHandle,
    operation: String,
}

impl BusyGuard {
    /// Operation holding the reader.
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.state
            .transition_from(DeviceState::Busy, DeviceState::Ready, &self.operation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ready() -> StateHandle {
        StateHandle::new(
            StateMachine::builder()
                .with_initial_state(DeviceState::Ready)
                .build(),
        )
    }

    #[test]
    fn test_busy_guard_round_trip() {
        let state = ready();
        let guard = state.try_begin("read_plate").unwrap();
        assert_eq!(state.current(), DeviceState::Busy);
        assert_eq!(guard.operation(), "read_plate");

        drop(guard);
        assert_eq!(state.current(), DeviceState::Ready);
    }

    #[test]
    fn test_second_claim_rejected_while_busy() {
        let state = ready();
        let _guard = state.try_begin("read_plate").unwrap();
        assert_eq!(
            state.try_begin("validate_plate").unwrap_err(),
            DeviceState::Busy
        );
    }

    #[test]
    fn test_fatal_failure_sticks_after_guard_drop() {
        let state = ready();
        let guard = state.try_begin("read_plate").unwrap();
        assert!(state.fail("connection lost").is_some());
        drop(guard);
        assert_eq!(state.current(), DeviceState::Error);
    }

    #[test]
    fn test_fail_ignored_when_disconnected() {
        let state = StateHandle::default();
        assert!(state.fail("no link").is_none());
        assert_eq!(state.current(), DeviceState::Disconnected);
    }

    #[test]
    fn test_transition_from_checks_current_state() {
        let state = ready();
        assert!(
            state
                .transition_from(DeviceState::Calibrating, DeviceState::Ready, "calibrate")
                .is_none()
        );
        assert!(
            state
                .transition_from(DeviceState::Ready, DeviceState::Calibrating, "calibrate")
                .is_some()
        );
        assert_eq!(state.current(), DeviceState::Calibrating);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let state = ready();
        let mut changes = state.subscribe();
        let _guard = state.try_begin("read_plate").unwrap();
        changes.changed().await.unwrap();
        assert_eq!(*changes.borrow(), DeviceState::Busy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_begin_when_ready_waits_out_busy() {
        let state = ready();
        let guard = state.try_begin("read_plate").unwrap();

        let waiter = {
            let state = state.clone();
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                state
                    .begin_when_ready("assay_tick", &cancel)
                    .await
                    .map(|guard| guard.is_some())
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        assert_eq!(waiter.await.unwrap(), Ok(true));
        assert_eq!(state.current(), DeviceState::Ready);
    }

    #[tokio::test]
    async fn test_begin_when_ready_cancelled() {
        let state = ready();
        let _guard = state.try_begin("read_plate").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = state.begin_when_ready("assay_tick", &cancel).await;
        assert!(matches!(outcome, Ok(None)));
    }

    #[tokio::test]
    async fn test_begin_when_ready_gives_up_on_error() {
        let state = ready();
        state.fail("lamp fault");
        let cancel = CancellationToken::new();

        let outcome = state.begin_when_ready("assay_tick", &cancel).await;
        assert_eq!(outcome.map(|g| g.is_some()), Err(DeviceState::Error));
    }
}
