use parking_lot::Mutex;
use serde::Serialize;

use crate::SubscriptionError;

/// Lifecycle of a subscription.
///
/// ```text
/// Connecting -> Active -> Draining -> Closed
///     |           |                    ^
///     +-----------+--------------------+
/// ```
///
/// `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Transport connected, topics not registered yet
    Connecting,
    /// Receiving events
    Active,
    /// No longer accepting events; flushing what is buffered
    Draining,
    Closed,
}

impl SubscriptionState {
    pub fn can_transition_to(
        self,
        next: SubscriptionState,
    ) -> bool {
        use SubscriptionState::*;
        matches!(
            (self, next),
            (Connecting, Active) | (Connecting, Closed) | (Active, Draining) | (Active, Closed) | (Draining, Closed)
        )
    }

    pub fn is_closed(self) -> bool {
        self == SubscriptionState::Closed
    }
}

/// Guarded state with validated transitions.
#[derive(Debug)]
pub(crate) struct StateCell {
    state: Mutex<SubscriptionState>,
}

impl StateCell {
    pub(crate) fn new(initial: SubscriptionState) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    pub(crate) fn get(&self) -> SubscriptionState {
        *self.state.lock()
    }

    /// Moves to `next`, returning the previous state.
    pub(crate) fn transition(
        &self,
        next: SubscriptionState,
    ) -> std::result::Result<SubscriptionState, SubscriptionError> {
        let mut state = self.state.lock();
        let from = *state;
        if !from.can_transition_to(next) {
            return Err(SubscriptionError::InvalidTransition { from, to: next });
        }
        *state = next;
        Ok(from)
    }

    /// Moves to `Closed` from any live state. Returns `false` if already closed.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.is_closed() {
            return false;
        }
        *state = SubscriptionState::Closed;
        true
    }
}
