//! Recognizer output as consumed by the caption pipeline.
//!
//! The recognizer itself is external; it leaves behind JSON "runs" (one per
//! utterance) in the shape Kaldi-style recognizers print:
//!
//! ```json
//! [{"text": "hello there", "result": [{"word": "hello", "start": 0.1, "end": 0.4, "conf": 0.93}, ...]}]
//! ```
//!
//! Runs without word entries are accepted when they carry `start`/`end`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::segmenter::TimedWord;

#[derive(Debug, Clone, Deserialize)]
pub struct RecognizedWord {
    pub word: String,
    pub start: f64,
    pub end: f64,
    #[serde(default = "full_confidence")]
    pub conf: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecognizerRun {
    #[serde(default)]
    pub result: Vec<RecognizedWord>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
    #[serde(default)]
    pub conf: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TranscriptFile {
    Runs(Vec<RecognizerRun>),
    Wrapped { runs: Vec<RecognizerRun> },
    Single(RecognizerRun),
}

fn full_confidence() -> f64 {
    1.0
}

impl RecognizerRun {
    /// Mean word confidence, falling back to the run-level value.
    pub fn confidence(&self) -> f64 {
        if self.result.is_empty() {
            return self.conf.unwrap_or(1.0);
        }
        self.result.iter().map(|w| w.conf).sum::<f64>() / self.result.len() as f64
    }

    fn span_ms(&self) -> Option<(u64, u64)> {
        let start = self.start.or_else(|| self.result.first().map(|w| w.start))?;
        let end = self.end.or_else(|| self.result.last().map(|w| w.end))?;
        Some((seconds_to_ms(start), seconds_to_ms(end)))
    }

    /// Per-word timings for this run.
    ///
    /// Recognized words keep their own timing. Text-only runs divide the run
    /// evenly: word i of n covers `[start + floor(i*d/n), start + floor((i+1)*d/n)]`.
    pub fn words(&self) -> Vec<TimedWord> {
        if !self.result.is_empty() {
            return self
                .result
                .iter()
                .filter(|w| !w.word.trim().is_empty())
                .map(|w| {
                    TimedWord::new(
                        w.word.trim(),
                        seconds_to_ms(w.start),
                        seconds_to_ms(w.end),
                        w.conf,
                    )
                })
                .collect();
        }

        let tokens: Vec<&str> = self.text.split_whitespace().collect();
        let Some((start_ms, end_ms)) = self.span_ms() else {
            return Vec::new();
        };
        if tokens.is_empty() {
            return Vec::new();
        }

        let duration = end_ms.saturating_sub(start_ms);
        let count = tokens.len() as u64;
        let confidence = self.confidence();
        tokens
            .iter()
            .enumerate()
            .map(|(i, token)| {
                let i = i as u64;
                TimedWord::new(
                    *token,
                    start_ms + i * duration / count,
                    start_ms + (i + 1) * duration / count,
                    confidence,
                )
            })
            .collect()
    }
}

fn seconds_to_ms(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0) as u64
}

pub fn parse_transcript(contents: &str) -> Result<Vec<RecognizerRun>> {
    let parsed: TranscriptFile =
        serde_json::from_str(contents).context("parsing recognizer transcript JSON")?;
    Ok(match parsed {
        TranscriptFile::Runs(runs) => runs,
        TranscriptFile::Wrapped { runs } => runs,
        TranscriptFile::Single(run) => vec![run],
    })
}

pub fn load_transcript(path: &Path) -> Result<Vec<RecognizerRun>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading recognizer transcript {}", path.display()))?;
    parse_transcript(&contents)
        .with_context(|| format!("invalid recognizer transcript {}", path.display()))
}

/// Drop runs whose mean confidence is below `threshold`, then flatten to
/// time-ordered words.
pub fn words_above_threshold(runs: &[RecognizerRun], threshold: f64) -> Vec<TimedWord> {
    let mut words: Vec<TimedWord> = runs
        .iter()
        .filter(|run| run.confidence() >= threshold)
        .flat_map(RecognizerRun::words)
        .collect();
    words.sort_by_key(|w| w.start_ms);
    words
}
