use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

use super::segmenter::CaptionSegment;

/// `HH:MM:SS,mmm` using integer floor division.
pub fn format_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

/// Numbered cues, blank-line separated.
pub fn to_srt(segments: &[CaptionSegment]) -> String {
    let mut out = String::new();
    for (idx, segment) in segments.iter().enumerate() {
        let _ = writeln!(out, "{}", idx + 1);
        let _ = writeln!(
            out,
            "{} --> {}",
            format_timestamp(segment.start_ms),
            format_timestamp(segment.end_ms)
        );
        let _ = writeln!(out, "{}", segment.text);
        out.push('\n');
    }
    out
}

pub fn write_srt(path: &Path, segments: &[CaptionSegment]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating caption directory {}", parent.display()))?;
    }
    fs::write(path, to_srt(segments))
        .with_context(|| format!("writing captions to {}", path.display()))
}

pub fn read_srt(path: &Path) -> Result<Vec<CaptionSegment>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading captions from {}", path.display()))?;
    parse_srt(&contents).with_context(|| format!("parsing captions in {}", path.display()))
}

/// Parse SRT text into caption segments (confidence 1.0), sorted by start.
pub fn parse_srt(input: &str) -> Result<Vec<CaptionSegment>> {
    let mut segments = Vec::new();
    let mut lines = input.lines().map(|l| l.trim_start_matches('\u{feff}')).peekable();

    while let Some(line) = lines.next() {
        let header = line.trim();
        if header.is_empty() {
            continue;
        }

        // The index line is optional in the wild
        let times = if header.contains("-->") {
            header
        } else {
            lines
                .next()
                .map(str::trim)
                .context("SRT cue is missing a timestamp line")?
        };

        let (start_raw, end_raw) = times
            .split_once("-->")
            .map(|(a, b)| (a.trim(), b.trim()))
            .context("SRT cue timestamp line must contain '-->'")?;

        let start_ms = parse_timestamp(start_raw)
            .with_context(|| format!("Failed to parse SRT start timestamp '{start_raw}'"))?;
        let end_ms = parse_timestamp(end_raw)
            .with_context(|| format!("Failed to parse SRT end timestamp '{end_raw}'"))?;

        if end_ms < start_ms {
            bail!("SRT cue ends before it starts: {start_raw} --> {end_raw}");
        }

        let mut text_lines = Vec::new();
        while let Some(next) = lines.next_if(|l| !l.trim().is_empty()) {
            text_lines.push(next.trim().to_string());
        }

        let text = text_lines.join(" ");
        if text.is_empty() {
            continue;
        }

        segments.push(CaptionSegment {
            start_ms,
            end_ms,
            text,
            confidence: 1.0,
        });
    }

    segments.sort_by_key(|segment| segment.start_ms);
    Ok(segments)
}

fn parse_timestamp(value: &str) -> Result<u64> {
    let cleaned = value.trim().replace(',', ".");
    let (time_part, fractional_part) = cleaned.split_once('.').unwrap_or((cleaned.as_str(), "0"));

    let mut hms = time_part.split(':');
    let mut next_component = |name: &str| -> Result<u64> {
        hms.next()
            .with_context(|| format!("Timestamp missing {name}"))?
            .parse::<u64>()
            .with_context(|| format!("Invalid {name} in timestamp"))
    };
    let hours = next_component("hours")?;
    let minutes = next_component("minutes")?;
    let seconds = next_component("seconds")?;

    if hms.next().is_some() {
        bail!("Timestamp has more than three components: {value}");
    }

    let millis: String = fractional_part
        .chars()
        .chain(std::iter::repeat('0'))
        .take(3)
        .collect();
    let millis = millis
        .parse::<u64>()
        .context("Invalid millisecond component in timestamp")?;

    Ok((hours * 3600 + minutes * 60 + seconds) * 1000 + millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_timestamps_exactly() {
        assert_eq!(format_timestamp(0), "00:00:00,000");
        assert_eq!(format_timestamp(1_234_567), "00:20:34,567");
        assert_eq!(format_timestamp(3_600_000 * 12 + 1), "12:00:00,001");
    }

    #[test]
    fn renders_numbered_cues() {
        let segments = vec![
            CaptionSegment {
                start_ms: 0,
                end_ms: 1500,
                text: "first line".to_string(),
                confidence: 0.9,
            },
            CaptionSegment {
                start_ms: 1500,
                end_ms: 2750,
                text: "second".to_string(),
                confidence: 0.8,
            },
        ];
        assert_eq!(
            to_srt(&segments),
            "1\n00:00:00,000 --> 00:00:01,500\nfirst line\n\n2\n00:00:01,500 --> 00:00:02,750\nsecond\n\n"
        );
    }

    #[test]
    fn parse_basic_srt() {
        let input = "1\n00:00:01,000 --> 00:00:03,500\nHello world!\n\n2\n00:00:04,000 --> 00:00:05,000\nNext line\n";
        let cues = parse_srt(input).expect("parse srt");
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "Hello world!");
        assert_eq!(cues[0].end_ms, 3500);
        assert_eq!(cues[1].start_ms, 4000);
    }

    #[test]
    fn parse_accepts_missing_index_and_short_fraction() {
        let cues = parse_srt("00:00:02.5 --> 00:00:03,25\nno index\n").unwrap();
        assert_eq!(cues[0].start_ms, 2500);
        assert_eq!(cues[0].end_ms, 3250);
    }

    #[test]
    fn parse_rejects_reversed_cue() {
        assert!(parse_srt("1\n00:00:05,000 --> 00:00:01,000\nbad\n").is_err());
    }

    #[test]
    fn written_file_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.srt");
        let segments = vec![CaptionSegment {
            start_ms: 100,
            end_ms: 900,
            text: "hi there".to_string(),
            confidence: 1.0,
        }];
        write_srt(&path, &segments).unwrap();
        assert_eq!(read_srt(&path).unwrap(), segments);
    }
}
