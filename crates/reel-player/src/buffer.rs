//! Playback buffer accounting.
//!
//! The manager tracks one contiguous buffered interval and the index of the
//! next segment to fetch. It never touches the network itself; `advance`
//! tells the session what to do and the session owns the fetch.
//!
//! Buffered time is variant-agnostic: all variants are assumed to share the
//! same segmentation (equal segment boundaries across renditions), so a
//! variant switch continues the same interval and the same segment index.
//! Content with unaligned renditions is outside this engine's model.

#![forbid(unsafe_code)]

use std::time::Duration;

use reel_hls::{Segment, VariantStream};
use tracing::debug;

use crate::error::{PlayerError, PlayerResult};

/// Slack allowed when checking that a completed segment abuts the buffered
/// end. Segment start times come from summed float durations.
const CONTIGUITY_TOLERANCE: Duration = Duration::from_millis(1);

/// The contiguous buffered interval in presentation time, inclusive ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferedRange {
    pub start: Duration,
    pub end: Duration,
}

/// What the session should do this tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferAction {
    /// Start fetching this segment index of the active variant.
    FetchNext(usize),
    /// Buffer is sufficiently full, nothing to do.
    Idle,
    /// The playhead caught up with the buffered end and no data can arrive
    /// right now (a fetch is already in flight, or there is nothing left).
    Stalled,
}

#[derive(Debug)]
pub struct BufferManager {
    target_ahead: Duration,
    buffered: Option<BufferedRange>,
    /// Next segment to fetch, `None` once the variant is exhausted.
    next_index: Option<usize>,
}

impl BufferManager {
    pub fn new(target_ahead: Duration) -> Self {
        Self {
            target_ahead,
            buffered: None,
            next_index: Some(0),
        }
    }

    pub fn buffered_range(&self) -> Option<BufferedRange> {
        self.buffered
    }

    /// Buffered media remaining ahead of `position`. Zero when the buffer is
    /// empty or the playhead is outside the buffered interval.
    pub fn buffered_ahead(&self, position: Duration) -> Duration {
        match self.buffered {
            Some(range) if position >= range.start => range.end.saturating_sub(position),
            _ => Duration::ZERO,
        }
    }

    /// One control-loop step. `fetch_outstanding` is whether the session has
    /// a segment fetch in flight; at most one ever is.
    pub fn advance(
        &self,
        position: Duration,
        variant: &VariantStream,
        fetch_outstanding: bool,
    ) -> BufferAction {
        let ahead = self.buffered_ahead(position);
        let next = self
            .next_index
            .filter(|&i| i < variant.segments.len());

        if ahead.is_zero() && (fetch_outstanding || next.is_none()) {
            return BufferAction::Stalled;
        }
        if ahead < self.target_ahead && !fetch_outstanding {
            if let Some(index) = next {
                return BufferAction::FetchNext(index);
            }
        }
        BufferAction::Idle
    }

    /// Records a completed segment fetch, extending the buffered interval by
    /// that segment. Segments must arrive in fetch order; anything else is
    /// an invariant violation under the single-outstanding-fetch discipline.
    pub fn on_segment_complete(&mut self, segment: &Segment) -> PlayerResult<()> {
        match self.next_index {
            Some(expected) if expected == segment.index => {}
            other => {
                return Err(PlayerError::InternalConsistency(format!(
                    "segment {} completed but {:?} was expected",
                    segment.index, other
                )));
            }
        }

        match &mut self.buffered {
            None => {
                self.buffered = Some(BufferedRange {
                    start: segment.start,
                    end: segment.end(),
                });
            }
            Some(range) => {
                let gap = segment.start.saturating_sub(range.end);
                if gap > CONTIGUITY_TOLERANCE || segment.start + CONTIGUITY_TOLERANCE < range.end {
                    return Err(PlayerError::InternalConsistency(format!(
                        "segment {} at {:?} does not abut buffered end {:?}",
                        segment.index, segment.start, range.end
                    )));
                }
                range.end = segment.end();
            }
        }

        self.next_index = Some(segment.index + 1);
        Ok(())
    }

    /// Re-targets the buffer after a seek. A target inside the buffered
    /// interval keeps it; anything else clears the buffer and points the
    /// next fetch at the segment containing the target.
    pub fn seek(&mut self, target: Duration, variant: &VariantStream) {
        if let Some(range) = self.buffered {
            if target >= range.start && target <= range.end {
                return;
            }
        }
        debug!(?target, "reel-player: seek outside buffer, clearing");
        self.buffered = None;
        self.next_index = variant.segment_containing(target);
    }
}

#[cfg(test)]
mod tests {
    use reel_hls::{parse_media_playlist, MediaPlaylist};
    use url::Url;

    use super::*;

    fn variant() -> VariantStream {
        let url = Url::parse("http://cdn.test.local/v0/playlist.m3u8").unwrap();
        let text = "\
#EXTM3U
#EXT-X-TARGETDURATION:4
#EXTINF:4.0,
seg-0.ts
#EXTINF:4.0,
seg-1.ts
#EXTINF:4.0,
seg-2.ts
#EXTINF:4.0,
seg-3.ts
#EXT-X-ENDLIST
";
        let media: MediaPlaylist = parse_media_playlist(text, &url).unwrap();
        VariantStream {
            bandwidth_bps: 500_000,
            height: Some(360),
            url,
            segments: media.segments,
        }
    }

    fn manager() -> BufferManager {
        BufferManager::new(Duration::from_secs(8))
    }

    #[test]
    fn empty_buffer_requests_first_segment() {
        let m = manager();
        assert_eq!(
            m.advance(Duration::ZERO, &variant(), false),
            BufferAction::FetchNext(0)
        );
    }

    #[test]
    fn outstanding_fetch_suppresses_new_requests() {
        let m = manager();
        assert_eq!(
            m.advance(Duration::ZERO, &variant(), true),
            BufferAction::Stalled
        );
    }

    #[test]
    fn segments_extend_the_buffer_in_order() {
        let v = variant();
        let mut m = manager();
        m.on_segment_complete(&v.segments[0]).unwrap();
        m.on_segment_complete(&v.segments[1]).unwrap();

        let range = m.buffered_range().unwrap();
        assert_eq!(range.start, Duration::ZERO);
        assert_eq!(range.end, Duration::from_secs(8));
        assert_eq!(m.buffered_ahead(Duration::from_secs(3)), Duration::from_secs(5));
    }

    #[test]
    fn out_of_order_completion_is_rejected() {
        let v = variant();
        let mut m = manager();
        m.on_segment_complete(&v.segments[0]).unwrap();

        let err = m.on_segment_complete(&v.segments[2]).unwrap_err();
        assert!(matches!(err, PlayerError::InternalConsistency(_)));
    }

    #[test]
    fn full_buffer_goes_idle() {
        let v = variant();
        let mut m = manager();
        m.on_segment_complete(&v.segments[0]).unwrap();
        m.on_segment_complete(&v.segments[1]).unwrap();

        // 8s buffered ahead of position 0 meets the 8s target.
        assert_eq!(m.advance(Duration::ZERO, &v, false), BufferAction::Idle);
        // Playhead movement reopens the deficit.
        assert_eq!(
            m.advance(Duration::from_secs(2), &v, false),
            BufferAction::FetchNext(2)
        );
    }

    #[test]
    fn exhausted_variant_stalls_when_caught_up() {
        let v = variant();
        let mut m = manager();
        for seg in &v.segments {
            m.on_segment_complete(seg).unwrap();
        }

        assert_eq!(m.advance(Duration::from_secs(10), &v, false), BufferAction::Idle);
        assert_eq!(
            m.advance(Duration::from_secs(16), &v, false),
            BufferAction::Stalled
        );
    }

    #[test]
    fn seek_outside_buffer_clears_and_retargets() {
        let v = variant();
        let mut m = manager();
        m.on_segment_complete(&v.segments[0]).unwrap();
        m.on_segment_complete(&v.segments[1]).unwrap();

        m.seek(Duration::from_secs(13), &v);
        assert_eq!(m.buffered_range(), None);
        assert_eq!(
            m.advance(Duration::from_secs(13), &v, false),
            BufferAction::FetchNext(3)
        );
    }

    #[test]
    fn seek_inside_buffer_keeps_it() {
        let v = variant();
        let mut m = manager();
        m.on_segment_complete(&v.segments[0]).unwrap();
        m.on_segment_complete(&v.segments[1]).unwrap();

        m.seek(Duration::from_secs(6), &v);
        assert!(m.buffered_range().is_some());
        assert_eq!(m.buffered_ahead(Duration::from_secs(6)), Duration::from_secs(2));
    }
}
