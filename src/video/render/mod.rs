mod error;
pub mod ffmpeg;
mod logging;
mod output;
pub mod position;
pub mod segments;
pub mod sequencer;
pub mod slideshow;
pub mod timeline;

use std::path::{Path, PathBuf};

use anyhow::Result;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Table};
use serde_json::json;

use crate::ui::prelude::{Level, OutputFormat, emit, get_output_format};

pub use self::error::RenderError;
use self::ffmpeg::command::RenderSettings;
use self::ffmpeg::compiler::transitions::{TransitionChoice, transition_duration};
use self::ffmpeg::compiler::util::format_time;
use self::ffmpeg::services::SystemFfmpegRunner;
use self::logging::log_event;
use self::output::prepare_output_destination;
use self::segments::MotionEffect;
use self::sequencer::{RenderPlan, RenderSequencer, SequencerOptions};
use self::slideshow::{
    SlideshowParams, caption_effect, check_render_params, chroma_effects, layer_effects,
    slideshow_timeline,
};
use super::captions::{self, CaptionSource, CaptionStyle, validate_model_dir};
use super::cli::{CaptionArgs, RenderArgs};
use super::config::{ProjectConfig, SubtitleConfig};
use super::images::{check_images, discover_images};
use super::support::ffmpeg::{FfprobeProbe, MediaProbe, resolve_tool};

pub fn handle_render(args: RenderArgs) -> Result<Option<PathBuf>> {
    log_event(
        Level::Info,
        "video.render.start",
        "Preparing render (reading config, images and narration)",
    );

    let config = ProjectConfig::load_optional(args.config.as_deref())?;
    let encoder = args.encoder.as_deref().unwrap_or(&config.encoder);
    let settings = RenderSettings::for_encoder(encoder, config.frame_rate())?;
    let transition = TransitionChoice::parse(&args.transition)?;
    let motion = MotionEffect::parse(&args.motion)?;
    let segment_duration = args.segment_duration.unwrap_or(config.segment_duration);
    let music_volume = args
        .music
        .music_volume
        .unwrap_or(config.background_music_volume);
    let chroma_slots = args.chroma.slots();
    let caption_style = resolve_caption_style(&args.captions, &config.subtitles)?;

    let mut report = config.validate();
    report.merge(check_render_params(
        &args.layers,
        &chroma_slots,
        args.music.music.as_deref(),
        segment_duration,
        music_volume,
        args.transition_duration,
    ));
    if captions_enabled(&args.captions, &config.subtitles) {
        report.errors.extend(caption_style.validate("caption"));
        if let Some(model) = &args.captions.caption_model {
            report.errors.extend(validate_model_dir(model));
        }
        if let Some(confidence) = args.captions.caption_confidence
            && !(0.0..=1.0).contains(&confidence)
        {
            report.error(format!(
                "caption confidence must be between 0 and 1, found {confidence}"
            ));
        }
        if let Some(max) = args.captions.caption_max_duration
            && !(0.5..=30.0).contains(&max)
        {
            report.error(format!(
                "caption max duration must be between 0.5 and 30 seconds, found {max}"
            ));
        }
    }
    for warning in &report.warnings {
        log_event(Level::Warn, "video.validate.warning", warning.as_str());
    }
    if !report.is_ok() {
        return Err(RenderError::Validation(report.errors).into());
    }

    if !args.audio.is_file() {
        return Err(RenderError::missing("narration audio", &args.audio).into());
    }
    let images = if args.images.is_empty() {
        let dir = args
            .image_dir
            .as_deref()
            .unwrap_or(&config.image_source_dir);
        discover_images(dir)?
    } else {
        check_images(&args.images)?
    };
    log_event(
        Level::Info,
        "video.render.images",
        format!("Using {} image(s)", images.len()),
    );

    let timeouts = config.timeouts.stage_timeouts();
    let ffmpeg = resolve_tool(
        args.ffmpeg.as_deref().or(config.ffmpeg_path.as_deref()),
        "ffmpeg",
    );
    let ffprobe = resolve_tool(
        args.ffprobe.as_deref().or(config.ffprobe_path.as_deref()),
        "ffprobe",
    );
    let probe = FfprobeProbe::new(ffprobe, timeouts.probe);

    let narration_duration = probe.duration(&args.audio);
    if narration_duration > 0.0 {
        log_event(
            Level::Info,
            "video.render.probe",
            format!("Narration lasts {}s", format_time(narration_duration)),
        );
    } else {
        log_event(
            Level::Warn,
            "video.render.probe.unknown",
            format!(
                "Could not measure {}; each image is shown once",
                args.audio.display()
            ),
        );
    }

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("output.{}", settings.container)));
    let mut inputs = images.clone();
    inputs.push(args.audio.clone());
    inputs.extend(args.music.music.clone());
    if !args.dry_run {
        prepare_output_destination(&output, &inputs, args.force)?;
    }

    let mut effects = layer_effects(&args.layers, &config.overlays);
    effects.extend(chroma_effects(&chroma_slots, &probe));
    if captions_enabled(&args.captions, &config.subtitles) {
        effects.extend(build_captions(
            &args.captions,
            &config.subtitles,
            caption_style,
        )?);
    }

    let crossfade = (!transition.is_none())
        .then(|| transition_duration(segment_duration, args.transition_duration));
    let timeline = slideshow_timeline(
        &SlideshowParams {
            images,
            segment_duration,
            narration: args.audio.clone(),
            narration_duration,
            music: args.music.music.clone().filter(|m| m.exists()),
            music_volume,
            fps: config.frame_rate(),
            resolution: config.resolution.into(),
            transition: crossfade,
        },
        effects,
    )?;

    let options = SequencerOptions {
        transition,
        transition_duration: args.transition_duration,
        motion,
        max_inputs_per_batch: args
            .max_inputs_per_batch
            .unwrap_or(config.max_inputs_per_batch),
        background_volume: music_volume,
        cache_dir: config.cache_dir(),
        timeouts,
        verbose: args.verbose,
        seed: args.seed,
    };

    let runner = SystemFfmpegRunner::new(ffmpeg.clone());
    let mut sequencer = RenderSequencer::new(&runner, &probe, settings, options);

    if args.dry_run {
        let plan = sequencer.plan(&timeline, &output)?;
        print_plan(&ffmpeg, &plan);
        log_event(
            Level::Info,
            "video.render.dry_run",
            "Dry run completed - ffmpeg commands printed above",
        );
        return Ok(None);
    }

    let rendered = sequencer.render(&timeline, &output)?;
    emit(
        Level::Success,
        "video.render.success",
        &format!(
            "Rendered {} ({}s)",
            rendered.output.display(),
            format_time(rendered.duration)
        ),
        Some(json!({
            "output": rendered.output.display().to_string(),
            "duration": rendered.duration,
            "steps": rendered.steps_run,
            "segments_rendered": rendered.segments_rendered,
            "cache_hit": rendered.cache_hit,
        })),
    );

    Ok(Some(output))
}

fn captions_enabled(args: &CaptionArgs, subtitles: &SubtitleConfig) -> bool {
    args.captions || subtitles.enabled
}

/// Config style (or preset) with command-line overrides applied.
pub(crate) fn resolve_caption_style(
    args: &CaptionArgs,
    subtitles: &SubtitleConfig,
) -> Result<CaptionStyle> {
    let mut style = subtitles.style_for(args.caption_preset.as_deref())?;
    if let Some(size) = args.caption_font_size {
        style.font_size = size;
    }
    if let Some(color) = &args.caption_font_color {
        style.font_color = color.clone();
    }
    if let Some(color) = &args.caption_bg_color {
        style.background_color = color.clone();
    }
    if let Some(position) = &args.caption_position {
        style.position = position.clone();
    }
    if let Some(margin) = args.caption_margin {
        style.margin_bottom = margin;
    }
    if let Some(font) = &args.caption_font_file {
        style.font_file = Some(font.clone());
    }
    Ok(style)
}

fn build_captions(
    args: &CaptionArgs,
    subtitles: &SubtitleConfig,
    style: CaptionStyle,
) -> Result<Option<timeline::EffectDescriptor>> {
    let source = match (&args.caption_srt, &args.caption_transcript) {
        (Some(srt), _) => CaptionSource::Srt(srt.clone()),
        (None, Some(transcript)) => CaptionSource::Transcript(transcript.clone()),
        (None, None) => {
            log_event(
                Level::Warn,
                "video.captions.no_source",
                "Captions are enabled but neither --caption-transcript nor --caption-srt was given; continuing without captions",
            );
            return Ok(None);
        }
    };

    let mut segmenter = subtitles.segmenter(&style);
    if let Some(max) = args.caption_max_duration {
        segmenter.max_duration_secs = max;
    }
    let confidence = args
        .caption_confidence
        .unwrap_or(subtitles.confidence_threshold);
    let segments = captions::build_caption_segments(&source, confidence, &segmenter)?;

    if let Some(path) = &args.export_srt
        && !segments.is_empty()
    {
        captions::srt::write_srt(path, &segments)?;
        log_event(
            Level::Info,
            "video.captions.exported",
            format!("Wrote {} caption(s) to {}", segments.len(), path.display()),
        );
    }

    Ok(caption_effect(segments, style))
}

fn print_plan(ffmpeg: &Path, plan: &RenderPlan) {
    let program = ffmpeg.to_string_lossy();
    for step in &plan.steps {
        let line = shell_words::join(
            std::iter::once(program.as_ref()).chain(step.args.iter().map(String::as_str)),
        );
        emit(
            Level::Info,
            "video.render.dry_run.step",
            &line,
            Some(json!({
                "state": step.state.to_string(),
                "label": step.label,
                "args": step.args,
                "timeout_secs": step.timeout.as_secs(),
            })),
        );
    }

    if get_output_format() == OutputFormat::Json {
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["#", "Stage", "Step", "Timeout", "Length"]);
    for (i, step) in plan.steps.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(step.state),
            Cell::new(&step.label),
            Cell::new(format!("{}s", step.timeout.as_secs())),
            Cell::new(
                step.expected_duration
                    .map(|d| format!("{}s", format_time(d)))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }
    println!("{table}");
    if plan.cache_hit {
        println!("Pre-rendered segments are cached; no segment renders needed.");
    }
}
