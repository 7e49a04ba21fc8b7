#![forbid(unsafe_code)]

use std::time::Duration;

use reel_hls::ParseError;
use reel_net::FetchError;
use thiserror::Error;

use crate::state::PlaybackState;

/// Session-level errors. `Parse` and `Fetch` carry the originating failure
/// when it ends the session; `InvalidOperation` is reported synchronously
/// and changes no state.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("`{op}` is not allowed in state {state:?}")]
    InvalidOperation {
        op: &'static str,
        state: PlaybackState,
    },

    #[error("no variant with index {index}")]
    UnknownVariant { index: usize },

    #[error("no subtitle track with index {index}")]
    UnknownSubtitleTrack { index: usize },

    #[error("stalled for longer than {max:?}")]
    StallTimeout { max: Duration },

    /// Invariant violation inside the session, always fatal.
    #[error("internal consistency violation: {0}")]
    InternalConsistency(String),
}

impl PlayerError {
    pub(crate) fn invalid_op(op: &'static str, state: PlaybackState) -> Self {
        Self::InvalidOperation { op, state }
    }

    /// Terminal errors move the session to `Errored`; `InvalidOperation`
    /// and unknown-index errors leave it running.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::InvalidOperation { .. }
                | Self::UnknownVariant { .. }
                | Self::UnknownSubtitleTrack { .. }
        )
    }
}

pub type PlayerResult<T> = Result<T, PlayerError>;
