//! Subtitle track loading and selection.
//!
//! Subtitles are side-band: any failure here is logged and swallowed, it
//! never disturbs the video pipeline.

#![forbid(unsafe_code)]

use std::time::Duration;

use reel_hls::{parse_webvtt, Cue, SubtitleTrack};
use reel_net::{Net, SegmentFetcher};
use tracing::{info, warn};
use url::Url;

use crate::error::{PlayerError, PlayerResult};

/// Where to find one subtitle track, as listed on the content record.
#[derive(Clone, Debug)]
pub struct SubtitleSource {
    pub lang: String,
    pub label: String,
    pub url: Url,
}

#[derive(Debug, Default)]
pub struct SubtitleManager {
    tracks: Vec<SubtitleTrack>,
    active: Option<usize>,
}

impl SubtitleManager {
    /// Loads every source, keeping whichever tracks parse. A source that
    /// fails to fetch or parse is dropped with a warning.
    pub async fn load<N: Net>(fetcher: &SegmentFetcher<N>, sources: &[SubtitleSource]) -> Self {
        let mut tracks = Vec::with_capacity(sources.len());

        for source in sources {
            match load_track(fetcher, source).await {
                Ok(track) => {
                    info!(lang = %track.lang, cues = track.cues().len(), "reel-player: subtitle track loaded");
                    tracks.push(track);
                }
                Err(err) => {
                    warn!(lang = %source.lang, url = %source.url, %err, "reel-player: dropping subtitle track");
                }
            }
        }

        Self {
            tracks,
            active: None,
        }
    }

    pub fn tracks(&self) -> &[SubtitleTrack] {
        &self.tracks
    }

    pub fn active_track(&self) -> Option<usize> {
        self.active
    }

    /// Selects a track by index, or `None` to turn subtitles off.
    pub fn select(&mut self, index: Option<usize>) -> PlayerResult<()> {
        if let Some(i) = index {
            if i >= self.tracks.len() {
                return Err(PlayerError::UnknownSubtitleTrack { index: i });
            }
        }
        self.active = index;
        Ok(())
    }

    /// The cue of the active track containing `position`, if any.
    pub fn active_cue(&self, position: Duration) -> Option<&Cue> {
        let track = &self.tracks[self.active?];
        track.active_cue(position)
    }
}

async fn load_track<N: Net>(
    fetcher: &SegmentFetcher<N>,
    source: &SubtitleSource,
) -> PlayerResult<SubtitleTrack> {
    let text = fetcher.fetch_text(&source.url).await?;
    let cues = parse_webvtt(&text)?;
    Ok(SubtitleTrack::new(
        source.lang.clone(),
        source.label.clone(),
        cues,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(lang: &str, cues: Vec<Cue>) -> SubtitleTrack {
        SubtitleTrack::new(lang, lang.to_uppercase(), cues)
    }

    fn cue(start: u64, end: u64, text: &str) -> Cue {
        Cue {
            start: Duration::from_secs(start),
            end: Duration::from_secs(end),
            text: text.to_owned(),
        }
    }

    #[test]
    fn no_active_track_means_no_cue() {
        let mgr = SubtitleManager {
            tracks: vec![track("en", vec![cue(0, 2, "a")])],
            active: None,
        };
        assert!(mgr.active_cue(Duration::from_secs(1)).is_none());
    }

    #[test]
    fn selection_switches_the_cue_source() {
        let mut mgr = SubtitleManager {
            tracks: vec![
                track("en", vec![cue(0, 2, "hello")]),
                track("de", vec![cue(0, 2, "hallo")]),
            ],
            active: None,
        };

        mgr.select(Some(1)).unwrap();
        assert_eq!(
            mgr.active_cue(Duration::from_secs(1)).unwrap().text,
            "hallo"
        );

        mgr.select(None).unwrap();
        assert!(mgr.active_cue(Duration::from_secs(1)).is_none());
    }

    #[test]
    fn out_of_range_selection_is_rejected() {
        let mut mgr = SubtitleManager::default();
        let err = mgr.select(Some(0)).unwrap_err();
        assert!(matches!(
            err,
            PlayerError::UnknownSubtitleTrack { index: 0 }
        ));
        assert_eq!(mgr.active_track(), None);
    }
}
