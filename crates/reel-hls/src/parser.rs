//! Line-oriented playlist parsing.
//!
//! The format is tag-based: a master document lists variant streams via
//! `#EXT-X-STREAM-INF`, a media document lists segments via `#EXTINF`.
//! Relative URIs resolve against the document's own URL. All errors carry
//! 1-based line numbers where a specific line is at fault.

#![forbid(unsafe_code)]

use std::time::Duration;

use reel_net::ByteRange;
use url::Url;

use crate::{
    error::{ParseError, ParseResult},
    manifest::{MasterPlaylist, MediaPlaylist, Segment, VariantRef},
};

const HEADER_TAG: &str = "#EXTM3U";
const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF:";
const EXTINF_TAG: &str = "#EXTINF:";
const BYTERANGE_TAG: &str = "#EXT-X-BYTERANGE:";
const TARGET_DURATION_TAG: &str = "#EXT-X-TARGETDURATION:";
const END_LIST_TAG: &str = "#EXT-X-ENDLIST";

/// Parses a master document into [`MasterPlaylist`].
pub fn parse_master_playlist(text: &str, base_url: &Url) -> ParseResult<MasterPlaylist> {
    check_header(text)?;

    let mut variants: Vec<VariantRef> = Vec::new();
    let mut pending: Option<(usize, u64, Option<u32>)> = None;

    for (line_no, raw) in numbered_lines(text) {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(attrs) = line.strip_prefix(STREAM_INF_TAG) {
            let (bandwidth, height) = parse_stream_inf(attrs, line_no)?;
            pending = Some((line_no, bandwidth, height));
        } else if line.starts_with('#') {
            // Unrecognized tags are skipped, per the format's forward
            // compatibility rules.
            continue;
        } else if let Some((_, bandwidth, height)) = pending.take() {
            let url = resolve(base_url, line)?;
            variants.push(VariantRef {
                index: variants.len(),
                bandwidth_bps: bandwidth,
                height,
                url,
            });
        }
        // A bare URI without a preceding STREAM-INF tag is not a variant
        // reference; ignore it.
    }

    if let Some((line_no, _, _)) = pending {
        // A STREAM-INF tag with no following URI line.
        return Err(ParseError::malformed(line_no));
    }
    if variants.is_empty() {
        return Err(ParseError::EmptyManifest);
    }

    Ok(MasterPlaylist { variants })
}

/// Parses a media document into [`MediaPlaylist`].
pub fn parse_media_playlist(text: &str, base_url: &Url) -> ParseResult<MediaPlaylist> {
    check_header(text)?;

    let mut segments: Vec<Segment> = Vec::new();
    let mut target_duration = None;
    let mut end_list = false;
    let mut pending_duration: Option<(usize, Duration)> = None;
    let mut pending_range: Option<ByteRange> = None;
    let mut range_cursor: u64 = 0;
    let mut start = Duration::ZERO;

    for (line_no, raw) in numbered_lines(text) {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(value) = line.strip_prefix(EXTINF_TAG) {
            let duration = parse_extinf(value, line_no)?;
            pending_duration = Some((line_no, duration));
        } else if let Some(value) = line.strip_prefix(BYTERANGE_TAG) {
            let range = parse_byterange(value, range_cursor, line_no)?;
            range_cursor = range.end.map(|e| e.saturating_add(1)).unwrap_or(range_cursor);
            pending_range = Some(range);
        } else if let Some(value) = line.strip_prefix(TARGET_DURATION_TAG) {
            let secs: u64 = value
                .trim()
                .parse()
                .map_err(|_| ParseError::malformed(line_no))?;
            target_duration = Some(Duration::from_secs(secs));
        } else if line == END_LIST_TAG {
            end_list = true;
        } else if line.starts_with('#') {
            continue;
        } else {
            let Some((_, duration)) = pending_duration.take() else {
                // A segment URI must be announced by an EXTINF tag.
                return Err(ParseError::malformed(line_no));
            };
            let url = resolve(base_url, line)?;
            segments.push(Segment {
                index: segments.len(),
                start,
                duration,
                url,
                byte_range: pending_range.take(),
            });
            start += duration;
        }
    }

    if let Some((line_no, _)) = pending_duration {
        return Err(ParseError::malformed(line_no));
    }
    if segments.is_empty() {
        return Err(ParseError::EmptyManifest);
    }

    Ok(MediaPlaylist {
        segments,
        target_duration,
        end_list,
    })
}

fn numbered_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines().enumerate().map(|(i, l)| (i + 1, l))
}

fn check_header(text: &str) -> ParseResult<()> {
    let first = text.lines().next().map(str::trim).unwrap_or("");
    // Tolerate a UTF-8 BOM before the header tag.
    if first.trim_start_matches('\u{feff}') != HEADER_TAG {
        return Err(ParseError::malformed(1));
    }
    Ok(())
}

fn resolve(base_url: &Url, uri: &str) -> ParseResult<Url> {
    base_url
        .join(uri)
        .map_err(|_| ParseError::invalid_reference(uri))
}

/// Parses the `#EXT-X-STREAM-INF` attribute list: `BANDWIDTH` is required,
/// `RESOLUTION=WxH` contributes the vertical resolution.
fn parse_stream_inf(attrs: &str, line_no: usize) -> ParseResult<(u64, Option<u32>)> {
    let mut bandwidth = None;
    let mut height = None;

    for attr in split_attributes(attrs) {
        let Some((key, value)) = attr.split_once('=') else {
            return Err(ParseError::malformed(line_no));
        };
        match key.trim() {
            "BANDWIDTH" => {
                bandwidth = Some(
                    value
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| ParseError::malformed(line_no))?,
                );
            }
            "RESOLUTION" => {
                let Some((_, h)) = value.trim().split_once('x') else {
                    return Err(ParseError::malformed(line_no));
                };
                height = Some(h.parse::<u32>().map_err(|_| ParseError::malformed(line_no))?);
            }
            _ => {}
        }
    }

    bandwidth
        .map(|b| (b, height))
        .ok_or(ParseError::malformed(line_no))
}

/// Splits a comma-separated attribute list, respecting quoted values
/// (`CODECS="avc1.4d401f,mp4a.40.2"` is one attribute).
fn split_attributes(attrs: &str) -> impl Iterator<Item = &str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (i, ch) in attrs.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&attrs[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&attrs[start..]);
    parts.into_iter().map(str::trim).filter(|p| !p.is_empty())
}

/// Parses `#EXTINF:<secs>[,<title>]`.
fn parse_extinf(value: &str, line_no: usize) -> ParseResult<Duration> {
    let secs_part = value.split(',').next().unwrap_or(value).trim();
    let secs: f64 = secs_part
        .parse()
        .map_err(|_| ParseError::malformed(line_no))?;
    // Rejects negative, non-finite and Duration-overflowing values alike.
    Duration::try_from_secs_f64(secs).map_err(|_| ParseError::malformed(line_no))
}

/// Parses `#EXT-X-BYTERANGE:<length>[@<offset>]`. When the offset is absent
/// the range continues where the previous one ended.
fn parse_byterange(value: &str, cursor: u64, line_no: usize) -> ParseResult<ByteRange> {
    let value = value.trim();
    let (len_part, offset) = match value.split_once('@') {
        Some((len, off)) => {
            let off: u64 = off.parse().map_err(|_| ParseError::malformed(line_no))?;
            (len, off)
        }
        None => (value, cursor),
    };
    let len: u64 = len_part
        .parse()
        .map_err(|_| ParseError::malformed(line_no))?;
    if len == 0 {
        return Err(ParseError::malformed(line_no));
    }
    let end = offset
        .checked_add(len - 1)
        .ok_or(ParseError::malformed(line_no))?;
    Ok(ByteRange::new(offset, Some(end)))
}
