//! Adaptive playback sessions.
//!
//! The engine decides *what* to fetch and *when*; decoding and rendering
//! belong to the host. Create a [`PlayerSession`] with a master manifest
//! URL, drive it with [`PlayerSession::tick`] while reporting the playhead
//! position, and consume media in presentation order from
//! [`PlayerSession::chunks`].

#![forbid(unsafe_code)]

mod buffer;
mod error;
mod events;
mod options;
mod session;
mod state;
mod subtitles;

pub use reel_abr::{AbrMode, SwitchReason};
pub use reel_hls::Cue;

pub use crate::{
    buffer::{BufferAction, BufferManager, BufferedRange},
    error::{PlayerError, PlayerResult},
    events::{EventEmitter, PlayerEvent},
    options::PlayerOptions,
    session::{MediaChunk, PlayerSession},
    state::{PlaybackState, StateMachine},
    subtitles::{SubtitleManager, SubtitleSource},
};
