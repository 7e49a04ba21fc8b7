#![forbid(unsafe_code)]

//! Manifest model, playlist parsing and subtitle cues.
//!
//! Everything in this crate is pure: parsers consume already-fetched text and
//! never touch the network themselves.

mod error;
mod manifest;
mod parser;
mod subtitles;

pub use crate::{
    error::{ParseError, ParseResult},
    manifest::{Manifest, MasterPlaylist, MediaPlaylist, Segment, VariantRef, VariantStream},
    parser::{parse_master_playlist, parse_media_playlist},
    subtitles::{parse_webvtt, Cue, SubtitleTrack},
};
