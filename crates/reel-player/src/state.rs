//! Transport state machine.

#![forbid(unsafe_code)]

use tracing::debug;

use crate::error::{PlayerError, PlayerResult};

/// Playback lifecycle state.
///
/// `Idle` is initial. `Ended` and `Errored` are terminal; a new session must
/// be created to retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Seeking,
    Stalled,
    Ended,
    Errored,
}

impl PlaybackState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Errored)
    }

    /// Whether a direct transition to `next` is legal.
    pub fn can_transition_to(self, next: Self) -> bool {
        use PlaybackState::*;

        if self.is_terminal() {
            return false;
        }
        // Any live state may fail; any state with media may finish.
        if next == Errored {
            return true;
        }
        if next == Ended {
            return !matches!(self, Idle | Loading);
        }

        matches!(
            (self, next),
            (Idle, Loading)
                | (Loading, Ready)
                | (Ready, Playing)
                | (Ready, Seeking)
                | (Ready, Stalled)
                | (Playing, Paused)
                | (Playing, Seeking)
                | (Playing, Stalled)
                | (Paused, Playing)
                | (Paused, Seeking)
                | (Paused, Stalled)
                | (Seeking, Ready)
                | (Stalled, Playing)
        )
    }
}

/// Validated wrapper around the current state. All session code goes through
/// [`StateMachine::transition`] so an illegal move surfaces immediately
/// instead of corrupting the session.
#[derive(Debug)]
pub struct StateMachine {
    state: PlaybackState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Idle,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn transition(&mut self, next: PlaybackState) -> PlayerResult<PlaybackState> {
        let from = self.state;
        if !from.can_transition_to(next) {
            return Err(PlayerError::InternalConsistency(format!(
                "illegal transition {from:?} -> {next:?}"
            )));
        }
        debug!(?from, to = ?next, "reel-player: state transition");
        self.state = next;
        Ok(from)
    }
}
