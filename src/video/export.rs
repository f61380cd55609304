use std::path::PathBuf;

use anyhow::{Result, bail};
use serde_json::json;

use super::captions::{self, CaptionSource};
use super::cli::CaptionsArgs;
use super::config::ProjectConfig;
use crate::ui::prelude::{Level, emit};

/// Segment a recognizer transcript and write (or print) it as SRT.
pub fn handle_captions(args: CaptionsArgs) -> Result<Option<PathBuf>> {
    let config = ProjectConfig::load_optional(args.config.as_deref())?;
    let subtitles = &config.subtitles;
    let style = subtitles.style_for(args.preset.as_deref())?;

    let mut segmenter = subtitles.segmenter(&style);
    if let Some(max) = args.max_duration {
        segmenter.max_duration_secs = max;
    }
    let confidence = args.confidence.unwrap_or(subtitles.confidence_threshold);

    let segments = captions::build_caption_segments(
        &CaptionSource::Transcript(args.transcript.clone()),
        confidence,
        &segmenter,
    )?;

    let Some(output) = args.output else {
        print!("{}", captions::srt::to_srt(&segments));
        return Ok(None);
    };

    if output.exists() && !args.force {
        bail!(
            "Output file {} already exists. Use --force to overwrite.",
            output.display()
        );
    }
    captions::srt::write_srt(&output, &segments)?;
    emit(
        Level::Success,
        "video.captions.exported",
        &format!("Wrote {} caption(s) to {}", segments.len(), output.display()),
        Some(json!({
            "output": output.display().to_string(),
            "count": segments.len(),
        })),
    );
    Ok(Some(output))
}
