//! Per-connection state machine.
//!
//! `Connecting → Joined → Receiving → Closed`. `Closed` is reachable from every
//! other state and absorbing.

use parking_lot::Mutex;
use thiserror::Error;

/// Where a connection is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake accepted, not yet announced.
    Connecting,
    /// Registered and announced to the room.
    Joined,
    /// Reading client frames.
    Receiving,
    /// Deregistered and departure announced.
    Closed,
}

impl ConnectionState {
    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Closed, _) => false,
            (_, Self::Closed) => true,
            (Self::Connecting, Self::Joined) | (Self::Joined, Self::Receiving) => true,
            _ => false,
        }
    }
}

/// A rejected state transition.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid connection transition {from:?} -> {to:?}")]
pub struct TransitionError {
    /// State at the time of the attempt.
    pub from: ConnectionState,
    /// Requested state.
    pub to: ConnectionState,
}

/// Guards a connection's state.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<ConnectionState>,
}

impl Lifecycle {
    /// Start in [`ConnectionState::Connecting`].
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Connecting),
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Move to `next` if the transition is legal.
    pub fn advance(&self, next: ConnectionState) -> Result<(), TransitionError> {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            return Err(TransitionError {
                from: *state,
                to: next,
            });
        }
        *state = next;
        Ok(())
    }

    /// Enter `Closed`. Returns `true` only for the call that actually closed
    /// it, so close work runs once.
    pub fn close(&self) -> bool {
        self.advance(ConnectionState::Closed).is_ok()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::{Closed, Connecting, Joined, Receiving};

    #[test]
    fn happy_path() {
        let lc = Lifecycle::new();
        assert_eq!(lc.state(), Connecting);
        lc.advance(Joined).unwrap();
        lc.advance(Receiving).unwrap();
        assert!(lc.close());
        assert_eq!(lc.state(), Closed);
    }

    #[test]
    fn close_runs_once() {
        let lc = Lifecycle::new();
        lc.advance(Joined).unwrap();
        assert!(lc.close());
        assert!(!lc.close());
        assert!(!lc.close());
    }

    #[test]
    fn closed_is_absorbing() {
        let lc = Lifecycle::new();
        assert!(lc.close());
        for next in [Connecting, Joined, Receiving, Closed] {
            assert_eq!(
                lc.advance(next),
                Err(TransitionError {
                    from: Closed,
                    to: next
                })
            );
        }
    }

    #[test]
    fn skipping_states_rejected() {
        let lc = Lifecycle::new();
        assert!(lc.advance(Receiving).is_err());
        lc.advance(Joined).unwrap();
        assert!(lc.advance(Joined).is_err());
        assert!(lc.advance(Connecting).is_err());
    }

    #[test]
    fn closed_reachable_from_every_live_state() {
        for from in [Connecting, Joined, Receiving] {
            assert!(from.can_transition_to(Closed));
        }
    }
}
