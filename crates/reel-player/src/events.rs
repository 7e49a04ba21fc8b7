//! Session events, fanned out over a broadcast channel.

#![forbid(unsafe_code)]

use std::time::Duration;

use reel_abr::SwitchReason;
use reel_hls::Cue;
use tokio::sync::broadcast;
use tracing::trace;

use crate::state::PlaybackState;

/// Observable session activity. Lagging subscribers lose the oldest events,
/// they are advisory and never drive control flow.
#[derive(Clone, Debug)]
pub enum PlayerEvent {
    StateChanged {
        from: PlaybackState,
        to: PlaybackState,
    },
    VariantChanged {
        from: usize,
        to: usize,
        reason: SwitchReason,
    },
    SegmentBuffered {
        variant: usize,
        segment: usize,
        buffered_to: Duration,
    },
    Progress {
        position: Duration,
        buffered_ahead: Duration,
    },
    SubtitleChanged {
        track: Option<usize>,
    },
    /// The active cue at the playhead changed, `None` when a cue ended with
    /// no successor.
    CueChanged {
        cue: Option<Cue>,
    },
    Stalled,
    Recovered,
    SessionError {
        message: String,
    },
}

#[derive(Clone, Debug)]
pub struct EventEmitter {
    tx: broadcast::Sender<PlayerEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Send failures mean nobody is listening, which is fine.
    pub fn emit(&self, event: PlayerEvent) {
        trace!(?event, "reel-player: event");
        let _ = self.tx.send(event);
    }
}
