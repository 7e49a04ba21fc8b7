//! Parsed manifest data model.
//!
//! Ownership is arena-style: the manifest owns its variants, each variant
//! owns its segments indexed by position. No node holds a reference back to
//! its parent, so the whole tree is plain owned data.

#![forbid(unsafe_code)]

use std::time::Duration;

use reel_net::ByteRange;
use tracing::warn;
use url::Url;

use crate::error::{ParseError, ParseResult};

/// Per-variant duration disagreement tolerated before logging a warning.
/// Subsecond drift between renditions of the same content is normal.
const DURATION_DRIFT_TOLERANCE: Duration = Duration::from_millis(100);

/// Parsed master document: the list of available variant references.
#[derive(Debug, Clone)]
pub struct MasterPlaylist {
    pub variants: Vec<VariantRef>,
}

/// One variant entry from a master document, before its segment list is
/// known.
#[derive(Debug, Clone)]
pub struct VariantRef {
    /// Stable index within the master document.
    pub index: usize,
    /// Advertised bandwidth in bits per second.
    pub bandwidth_bps: u64,
    /// Vertical resolution, if advertised.
    pub height: Option<u32>,
    /// Resolved URL of the variant's media document.
    pub url: Url,
}

/// Parsed media document for a single variant.
#[derive(Debug, Clone)]
pub struct MediaPlaylist {
    pub segments: Vec<Segment>,
    pub target_duration: Option<Duration>,
    /// Whether the document carried an end marker (VOD or finished live).
    pub end_list: bool,
}

impl MediaPlaylist {
    /// Sum of all segment durations.
    pub fn total_duration(&self) -> Duration {
        self.segments.iter().map(|s| s.duration).sum()
    }
}

/// One media segment. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Position within the variant's segment sequence.
    pub index: usize,
    /// Presentation-time start, cumulative over preceding segments.
    pub start: Duration,
    pub duration: Duration,
    pub url: Url,
    pub byte_range: Option<ByteRange>,
}

impl Segment {
    /// Presentation-time end (exclusive).
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

/// A fully-assembled manifest: master document plus every variant's segment
/// list.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Source URL of the master document.
    pub url: Url,
    pub variants: Vec<VariantStream>,
    /// Total presentation duration. Always known for VOD manifests.
    pub duration: Option<Duration>,
}

/// One quality rendition with its complete segment list.
#[derive(Debug, Clone)]
pub struct VariantStream {
    pub bandwidth_bps: u64,
    pub height: Option<u32>,
    /// URL of the variant's media document.
    pub url: Url,
    pub segments: Vec<Segment>,
}

impl VariantStream {
    pub fn total_duration(&self) -> Duration {
        self.segments.iter().map(|s| s.duration).sum()
    }

    /// Index of the segment whose `[start, end)` window contains `position`.
    ///
    /// Binary search over the cumulative start times; `None` when `position`
    /// is at or past the end of the variant.
    pub fn segment_containing(&self, position: Duration) -> Option<usize> {
        let idx = self
            .segments
            .partition_point(|s| s.start <= position)
            .checked_sub(1)?;
        let seg = &self.segments[idx];
        (position < seg.end()).then_some(idx)
    }
}

impl Manifest {
    /// Combine a parsed master document with one parsed media document per
    /// variant.
    ///
    /// Rejects empty inputs with [`ParseError::EmptyManifest`]. The manifest
    /// duration is the largest per-variant sum; variants disagreeing beyond a
    /// small tolerance are logged but accepted.
    pub fn assemble(
        url: Url,
        master: MasterPlaylist,
        media: Vec<MediaPlaylist>,
    ) -> ParseResult<Self> {
        if master.variants.is_empty() || media.is_empty() {
            return Err(ParseError::EmptyManifest);
        }
        debug_assert_eq!(master.variants.len(), media.len());

        let mut variants = Vec::with_capacity(master.variants.len());
        let mut duration = Duration::ZERO;

        for (variant, playlist) in master.variants.into_iter().zip(media) {
            if playlist.segments.is_empty() {
                return Err(ParseError::EmptyManifest);
            }

            let total = playlist.total_duration();
            if duration != Duration::ZERO {
                let drift = if total > duration {
                    total - duration
                } else {
                    duration - total
                };
                if drift > DURATION_DRIFT_TOLERANCE {
                    warn!(
                        variant_index = variant.index,
                        variant_secs = total.as_secs_f64(),
                        manifest_secs = duration.as_secs_f64(),
                        "reel-hls: variant duration drifts from manifest duration"
                    );
                }
            }
            duration = duration.max(total);

            variants.push(VariantStream {
                bandwidth_bps: variant.bandwidth_bps,
                height: variant.height,
                url: variant.url,
                segments: playlist.segments,
            });
        }

        Ok(Self {
            url,
            variants,
            duration: Some(duration),
        })
    }

    /// Index of the lowest-bandwidth variant.
    pub fn lowest_variant(&self) -> usize {
        self.variants
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| v.bandwidth_bps)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(index: usize, start_secs: f64, dur_secs: f64) -> Segment {
        Segment {
            index,
            start: Duration::from_secs_f64(start_secs),
            duration: Duration::from_secs_f64(dur_secs),
            url: Url::parse("http://test.local/seg.ts").unwrap(),
            byte_range: None,
        }
    }

    fn variant(segments: Vec<Segment>) -> VariantStream {
        VariantStream {
            bandwidth_bps: 1_000_000,
            height: Some(720),
            url: Url::parse("http://test.local/v.m3u8").unwrap(),
            segments,
        }
    }

    #[test]
    fn segment_containing_maps_positions() {
        let v = variant(vec![seg(0, 0.0, 4.0), seg(1, 4.0, 4.0), seg(2, 8.0, 2.0)]);

        assert_eq!(v.segment_containing(Duration::ZERO), Some(0));
        assert_eq!(v.segment_containing(Duration::from_secs_f64(3.9)), Some(0));
        assert_eq!(v.segment_containing(Duration::from_secs(4)), Some(1));
        assert_eq!(v.segment_containing(Duration::from_secs_f64(9.5)), Some(2));
        // End of the variant is exclusive.
        assert_eq!(v.segment_containing(Duration::from_secs(10)), None);
    }

    #[test]
    fn assemble_rejects_empty_master() {
        let err = Manifest::assemble(
            Url::parse("http://test.local/master.m3u8").unwrap(),
            MasterPlaylist { variants: vec![] },
            vec![],
        )
        .unwrap_err();
        assert_eq!(err, ParseError::EmptyManifest);
    }

    #[test]
    fn assemble_rejects_variant_without_segments() {
        let master = MasterPlaylist {
            variants: vec![VariantRef {
                index: 0,
                bandwidth_bps: 500_000,
                height: None,
                url: Url::parse("http://test.local/v0.m3u8").unwrap(),
            }],
        };
        let media = vec![MediaPlaylist {
            segments: vec![],
            target_duration: None,
            end_list: true,
        }];

        let err = Manifest::assemble(
            Url::parse("http://test.local/master.m3u8").unwrap(),
            master,
            media,
        )
        .unwrap_err();
        assert_eq!(err, ParseError::EmptyManifest);
    }

    #[test]
    fn assemble_takes_longest_variant_duration() {
        let master = MasterPlaylist {
            variants: vec![
                VariantRef {
                    index: 0,
                    bandwidth_bps: 500_000,
                    height: None,
                    url: Url::parse("http://test.local/v0.m3u8").unwrap(),
                },
                VariantRef {
                    index: 1,
                    bandwidth_bps: 1_500_000,
                    height: Some(720),
                    url: Url::parse("http://test.local/v1.m3u8").unwrap(),
                },
            ],
        };
        let media = vec![
            MediaPlaylist {
                segments: vec![seg(0, 0.0, 4.0), seg(1, 4.0, 4.0)],
                target_duration: Some(Duration::from_secs(4)),
                end_list: true,
            },
            MediaPlaylist {
                segments: vec![seg(0, 0.0, 4.0), seg(1, 4.0, 4.05)],
                target_duration: Some(Duration::from_secs(4)),
                end_list: true,
            },
        ];

        let manifest = Manifest::assemble(
            Url::parse("http://test.local/master.m3u8").unwrap(),
            master,
            media,
        )
        .unwrap();
        assert_eq!(manifest.duration, Some(Duration::from_secs_f64(8.05)));
        assert_eq!(manifest.lowest_variant(), 0);
    }
}
