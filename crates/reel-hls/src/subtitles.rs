//! WebVTT subtitle parsing and cue lookup.

#![forbid(unsafe_code)]

use std::time::Duration;

use tracing::warn;

use crate::error::{ParseError, ParseResult};

/// A single timed caption. The interval is start-inclusive, end-exclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cue {
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

impl Cue {
    pub fn contains(&self, position: Duration) -> bool {
        position >= self.start && position < self.end
    }
}

/// A parsed subtitle track, cues sorted by start time.
#[derive(Clone, Debug)]
pub struct SubtitleTrack {
    pub lang: String,
    pub label: String,
    cues: Vec<Cue>,
}

impl SubtitleTrack {
    pub fn new(lang: impl Into<String>, label: impl Into<String>, mut cues: Vec<Cue>) -> Self {
        cues.sort_by_key(|c| c.start);
        clip_overlaps(&mut cues);
        Self {
            lang: lang.into(),
            label: label.into(),
            cues,
        }
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    /// The cue whose interval contains `position`, if any.
    ///
    /// Binary search over the sorted starts, then a containment check on the
    /// candidate. O(log n) per lookup.
    pub fn active_cue(&self, position: Duration) -> Option<&Cue> {
        let idx = self.cues.partition_point(|c| c.start <= position);
        let cue = self.cues[..idx].last()?;
        cue.contains(position).then_some(cue)
    }
}

/// Where overlapping cues meet, the earlier cue yields: its end is clipped
/// to the next cue's start so lookups stay unambiguous.
fn clip_overlaps(cues: &mut [Cue]) {
    for i in 1..cues.len() {
        let next_start = cues[i].start;
        let prev = &mut cues[i - 1];
        if prev.end > next_start {
            warn!(
                "reel-hls: overlapping cues at {:?}, clipping earlier cue",
                next_start
            );
            prev.end = next_start;
        }
    }
}

/// Parses a WebVTT document into a list of cues.
///
/// Supports the common subset: a `WEBVTT` header, optional cue identifiers,
/// `HH:MM:SS.mmm` or `MM:SS.mmm` timestamps, multi-line payloads. `NOTE` and
/// `STYLE` blocks are skipped.
pub fn parse_webvtt(text: &str) -> ParseResult<Vec<Cue>> {
    let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l)).peekable();

    let header = lines.next().map(|(_, l)| l.trim()).unwrap_or("");
    if !header.trim_start_matches('\u{feff}').starts_with("WEBVTT") {
        return Err(ParseError::malformed(1));
    }

    let mut cues = Vec::new();

    while let Some((line_no, raw)) = lines.next() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("NOTE") || line == "STYLE" || line == "REGION" {
            skip_block(&mut lines);
            continue;
        }

        // Either a timing line, or a cue identifier directly above one.
        let timing = if line.contains("-->") {
            (line_no, line.to_owned())
        } else {
            match lines.next() {
                Some((no, next)) if next.contains("-->") => (no, next.trim().to_owned()),
                _ => return Err(ParseError::malformed(line_no)),
            }
        };

        let (start, end) = parse_timing_line(&timing.1, timing.0)?;

        let mut payload = Vec::new();
        while let Some(&(_, next)) = lines.peek() {
            if next.trim().is_empty() {
                break;
            }
            payload.push(next.trim().to_owned());
            lines.next();
        }

        if end <= start {
            return Err(ParseError::malformed(timing.0));
        }
        cues.push(Cue {
            start,
            end,
            text: payload.join("\n"),
        });
    }

    Ok(cues)
}

fn skip_block<'a>(lines: &mut std::iter::Peekable<impl Iterator<Item = (usize, &'a str)>>) {
    while let Some(&(_, next)) = lines.peek() {
        if next.trim().is_empty() {
            break;
        }
        lines.next();
    }
}

/// Parses `<start> --> <end>[ settings]`.
fn parse_timing_line(line: &str, line_no: usize) -> ParseResult<(Duration, Duration)> {
    let (start_part, rest) = line
        .split_once("-->")
        .ok_or(ParseError::malformed(line_no))?;
    // Cue settings may follow the end timestamp.
    let end_part = rest.trim().split_whitespace().next().unwrap_or("");

    let start = parse_timestamp(start_part.trim(), line_no)?;
    let end = parse_timestamp(end_part, line_no)?;
    Ok((start, end))
}

/// Parses `HH:MM:SS.mmm` or `MM:SS.mmm`.
fn parse_timestamp(value: &str, line_no: usize) -> ParseResult<Duration> {
    let malformed = || ParseError::malformed(line_no);

    let (clock, millis_part) = value.split_once('.').ok_or_else(malformed)?;
    let millis: u64 = millis_part.parse().map_err(|_| malformed())?;
    if millis_part.len() != 3 {
        return Err(malformed());
    }

    let fields: Vec<&str> = clock.split(':').collect();
    let (hours, minutes, seconds) = match fields.as_slice() {
        [m, s] => ("0", *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => return Err(malformed()),
    };

    let hours: u64 = hours.parse().map_err(|_| malformed())?;
    let minutes: u64 = minutes.parse().map_err(|_| malformed())?;
    let seconds: u64 = seconds.parse().map_err(|_| malformed())?;
    if minutes > 59 || seconds > 59 {
        return Err(malformed());
    }

    // Checked arithmetic: an absurd hours field must come back as a parse
    // error, not an overflow.
    let total_ms = hours
        .checked_mul(60)
        .and_then(|v| v.checked_add(minutes))
        .and_then(|v| v.checked_mul(60))
        .and_then(|v| v.checked_add(seconds))
        .and_then(|v| v.checked_mul(1000))
        .and_then(|v| v.checked_add(millis))
        .ok_or_else(malformed)?;

    Ok(Duration::from_millis(total_ms))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn cue(start_ms: u64, end_ms: u64, text: &str) -> Cue {
        Cue {
            start: Duration::from_millis(start_ms),
            end: Duration::from_millis(end_ms),
            text: text.to_owned(),
        }
    }

    #[test]
    fn lookup_is_end_exclusive() {
        let track = SubtitleTrack::new(
            "en",
            "English",
            vec![cue(0, 2000, "a"), cue(2000, 5000, "b")],
        );

        let at = |ms| track.active_cue(Duration::from_millis(ms)).map(|c| c.text.as_str());
        assert_eq!(at(1500), Some("a"));
        assert_eq!(at(2000), Some("b"));
        assert_eq!(at(4999), Some("b"));
        assert_eq!(at(5000), None);
        assert_eq!(at(9000), None);
    }

    #[test]
    fn lookup_in_gap_between_cues() {
        let track = SubtitleTrack::new("en", "English", vec![cue(0, 1000, "a"), cue(3000, 4000, "b")]);
        assert!(track.active_cue(Duration::from_millis(2000)).is_none());
    }

    #[test]
    fn overlapping_cues_are_clipped() {
        let track = SubtitleTrack::new("en", "English", vec![cue(0, 3000, "a"), cue(2000, 4000, "b")]);
        assert_eq!(track.cues()[0].end, Duration::from_millis(2000));
        assert_eq!(
            track.active_cue(Duration::from_millis(2500)).unwrap().text,
            "b"
        );
    }

    const VTT: &str = "\
WEBVTT

NOTE a comment block
spanning two lines

1
00:00:00.000 --> 00:00:02.000
First line
second line

00:02.500 --> 00:05.000 align:center
Short form timestamps
";

    #[test]
    fn parses_webvtt_document() {
        let cues = parse_webvtt(VTT).unwrap();

        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0], cue(0, 2000, "First line\nsecond line"));
        assert_eq!(cues[1].start, Duration::from_millis(2500));
        assert_eq!(cues[1].end, Duration::from_millis(5000));
        assert_eq!(cues[1].text, "Short form timestamps");
    }

    #[test]
    fn empty_document_yields_no_cues() {
        assert_eq!(parse_webvtt("WEBVTT\n").unwrap(), Vec::new());
    }

    #[test]
    fn missing_header_is_rejected() {
        let err = parse_webvtt("00:00.000 --> 00:01.000\nhi\n").unwrap_err();
        assert_eq!(err, ParseError::MalformedField { line: 1 });
    }

    #[rstest]
    #[case::bad_timestamp("WEBVTT\n\n00:00:xx.000 --> 00:00:02.000\nhi\n", 3)]
    #[case::reversed_interval("WEBVTT\n\n00:00:05.000 --> 00:00:02.000\nhi\n", 3)]
    #[case::missing_millis("WEBVTT\n\n00:00:01 --> 00:00:02\nhi\n", 3)]
    #[case::overflowing_hours(
        "WEBVTT\n\n18446744073709551615:00:01.000 --> 18446744073709551615:00:02.000\nhi\n",
        3
    )]
    #[case::identifier_without_timing("WEBVTT\n\nlonely-id\nnot a timing line\n", 3)]
    fn malformed_cues_carry_line_numbers(#[case] text: &str, #[case] line: usize) {
        let err = parse_webvtt(text).unwrap_err();
        assert_eq!(err, ParseError::MalformedField { line });
    }
}
