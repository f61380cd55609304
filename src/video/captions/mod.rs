mod segmenter;
pub mod srt;
mod style;
mod transcript;

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::ui::prelude::{Level, emit};

pub use self::segmenter::{CaptionSegment, SegmenterConfig};
pub use self::style::CaptionStyle;
use self::segmenter::segment_words;
use self::transcript::{load_transcript, words_above_threshold};

/// Subdirectories a recognizer model directory must contain.
pub const MODEL_SUBDIRS: [&str; 3] = ["am", "conf", "graph"];

/// Where caption text comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptionSource {
    /// Recognizer runs to be filtered and segmented.
    Transcript(PathBuf),
    /// Ready-made cues.
    Srt(PathBuf),
}

/// Turn a caption source into display segments.
///
/// Returns an empty list (with a warning) when nothing survives filtering;
/// callers render without captions in that case.
pub fn build_caption_segments(
    source: &CaptionSource,
    confidence_threshold: f64,
    config: &SegmenterConfig,
) -> Result<Vec<CaptionSegment>> {
    let segments = match source {
        CaptionSource::Srt(path) => srt::read_srt(path)?,
        CaptionSource::Transcript(path) => {
            let runs = load_transcript(path)?;
            let words = words_above_threshold(&runs, confidence_threshold);
            emit(
                Level::Debug,
                "video.captions.words",
                &format!(
                    "{} of {} recognizer runs passed confidence {:.2}; {} words",
                    runs.iter()
                        .filter(|r| r.confidence() >= confidence_threshold)
                        .count(),
                    runs.len(),
                    confidence_threshold,
                    words.len()
                ),
                None,
            );
            segment_words(&words, config)
        }
    };

    if segments.is_empty() {
        emit(
            Level::Warn,
            "video.captions.empty",
            "No speech segments found; continuing without captions",
            None,
        );
    }

    Ok(segments)
}

/// Problems with a recognizer model directory, one message each.
pub fn validate_model_dir(path: &Path) -> Vec<String> {
    if !path.is_dir() {
        return vec![format!(
            "caption model directory not found: {}",
            path.display()
        )];
    }
    MODEL_SUBDIRS
        .iter()
        .filter(|sub| !path.join(sub).exists())
        .map(|sub| {
            format!(
                "caption model directory {} is missing '{sub}'",
                path.display()
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn model_dir_requires_all_subfolders() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("am")).unwrap();
        let errors = validate_model_dir(dir.path());
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("'conf'")));
        assert!(errors.iter().any(|e| e.contains("'graph'")));

        fs::create_dir(dir.path().join("conf")).unwrap();
        fs::create_dir(dir.path().join("graph")).unwrap();
        assert!(validate_model_dir(dir.path()).is_empty());
    }

    #[test]
    fn missing_model_dir_is_one_error() {
        let errors = validate_model_dir(Path::new("/definitely/not/here"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn transcript_source_is_filtered_and_segmented() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.json");
        fs::write(
            &path,
            r#"[
              {"result":[{"word":"noise","start":0.0,"end":0.2,"conf":0.1}]},
              {"result":[
                {"word":"one","start":1.0,"end":1.2,"conf":0.9},
                {"word":"two.","start":1.2,"end":1.4,"conf":0.9},
                {"word":"three","start":1.4,"end":1.6,"conf":0.9}]}
            ]"#,
        )
        .unwrap();
        let segments = build_caption_segments(
            &CaptionSource::Transcript(path),
            0.5,
            &SegmenterConfig::default(),
        )
        .unwrap();
        let texts: Vec<_> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["one two.", "three"]);
        assert_eq!(segments[0].start_ms, 1000);
    }

    #[test]
    fn no_speech_is_soft() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quiet.json");
        fs::write(&path, "[]").unwrap();
        let segments = build_caption_segments(
            &CaptionSource::Transcript(path),
            0.5,
            &SegmenterConfig::default(),
        )
        .unwrap();
        assert!(segments.is_empty());
    }
}
