mod audio;
mod captions;
mod inputs;
mod overlays;
pub mod transitions;
pub mod util;


use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::json;

use super::graph::{FilterGraph, InputSpec};
use crate::ui::prelude::{Level, emit};
use crate::video::render::timeline::{EffectDescriptor, EffectTarget, Resolution};

pub use self::audio::{AudioRole, AudioTrack, DuckingParams, mix_audio_tracks};

pub const LOGO: &str = "logo";
pub const OVERLAY: &str = "overlay";
pub const COVER: &str = "cover";
pub const CHROMA_OVERLAY: &str = "chroma_overlay";
pub const CHROMA_OVERLAY_ALIAS: &str = "overlay_chromakey";
pub const CAPTION: &str = "caption";
pub const VOLUME: &str = "volume";

/// Layering rank; lower draws first so later effects end up on top.
pub fn effect_rank(name: &str) -> Option<u8> {
    match name {
        OVERLAY => Some(0),
        LOGO => Some(1),
        COVER => Some(2),
        CHROMA_OVERLAY | CHROMA_OVERLAY_ALIAS => Some(3),
        CAPTION => Some(4),
        _ => None,
    }
}

/// Values resolved once per render and shared by every effect.
#[derive(Debug, Clone, Copy)]
pub struct EffectContext {
    pub resolution: Resolution,
    /// The current audio label carries narration; enables ducking.
    pub has_narration: bool,
    pub ducking: DuckingParams,
}

impl EffectContext {
    pub fn new(resolution: Resolution, has_narration: bool) -> Self {
        Self {
            resolution,
            has_narration,
            ducking: DuckingParams::default(),
        }
    }
}

/// Result of applying one effect.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectOutcome {
    /// Serialized stages this effect added; empty when skipped or ignored.
    pub fragment: String,
    pub video: String,
    pub audio: Option<String>,
    pub inputs_consumed: usize,
}

impl EffectOutcome {
    fn unchanged(video: &str, audio: Option<&str>) -> Self {
        Self {
            fragment: String::new(),
            video: video.to_string(),
            audio: audio.map(str::to_string),
            inputs_consumed: 0,
        }
    }
}

/// Labels an effect implementation hands back.
struct Applied {
    video: String,
    audio: Option<String>,
}

/// Apply a single effect on top of `video`/`audio`.
///
/// The next input index is always `graph.inputs().len()`. Effects whose file
/// is missing are skipped with a `video.effect.skipped` warning; unknown
/// names are ignored.
pub fn apply_effect(
    graph: &mut FilterGraph,
    video: &str,
    audio: Option<&str>,
    effect: &EffectDescriptor,
    ctx: &EffectContext,
) -> Result<EffectOutcome> {
    if effect_rank(&effect.name).is_none() || effect.target == EffectTarget::Audio {
        return Ok(EffectOutcome::unchanged(video, audio));
    }

    let stages_before = graph.stages().len();
    let inputs_before = graph.inputs().len();

    let applied = if effect.name == CAPTION {
        captions::burn_captions(graph, video, effect)?
    } else {
        let Some(path) = existing_path(effect) else {
            return Ok(EffectOutcome::unchanged(video, audio));
        };
        match effect.name.as_str() {
            LOGO => overlays::apply_logo(graph, video, &path, effect)?,
            OVERLAY => overlays::apply_overlay(graph, video, &path, effect, ctx)?,
            COVER => overlays::apply_cover(graph, video, &path, effect)?,
            _ => overlays::apply_chroma(graph, video, audio, &path, effect, ctx)?,
        }
    };

    let audio = applied.audio.or_else(|| audio.map(str::to_string));
    Ok(EffectOutcome {
        fragment: graph.fragment_since(stages_before),
        video: applied.video,
        audio,
        inputs_consumed: graph.inputs().len() - inputs_before,
    })
}

/// Apply `effects` in layering order (stable for equal ranks).
pub fn apply_effects(
    graph: &mut FilterGraph,
    video: &str,
    audio: Option<&str>,
    effects: &[&EffectDescriptor],
    ctx: &EffectContext,
) -> Result<(String, Option<String>)> {
    let mut ordered: Vec<&EffectDescriptor> = effects
        .iter()
        .copied()
        .filter(|e| effect_rank(&e.name).is_some())
        .collect();
    ordered.sort_by_key(|e| effect_rank(&e.name));

    let mut video = video.to_string();
    let mut audio = audio.map(str::to_string);
    for effect in ordered {
        let outcome = apply_effect(graph, &video, audio.as_deref(), effect, ctx)?;
        video = outcome.video;
        audio = outcome.audio;
    }
    Ok((video, audio))
}

fn existing_path(effect: &EffectDescriptor) -> Option<PathBuf> {
    match effect.path("path") {
        Some(path) if path.exists() => Some(path.to_path_buf()),
        Some(path) => {
            skip_effect(effect, Some(path), "file not found");
            None
        }
        None => {
            skip_effect(effect, None, "no path given");
            None
        }
    }
}

fn skip_effect(effect: &EffectDescriptor, path: Option<&Path>, reason: &str) {
    let shown = path
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let message = format!("Skipping {} effect: {reason} {shown}", effect.name);
    emit(
        Level::Warn,
        "video.effect.skipped",
        message.trim_end(),
        Some(json!({
            "effect": effect.name,
            "path": shown,
            "reason": reason,
        })),
    );
}

/// Builds the effects-and-audio pass on top of an already assembled video.
pub struct FfmpegCompiler {
    resolution: Resolution,
}

impl FfmpegCompiler {
    pub fn new(resolution: Resolution) -> Self {
        Self { resolution }
    }

    /// Graph with `base` as input 0, audio tracks next, then effect inputs.
    ///
    /// `video_out` stays the raw `0:v` and `audio_out` a raw `N:a` when no
    /// stage is needed.
    pub fn compile(
        &self,
        base: InputSpec,
        audio: &[AudioTrack],
        effects: &[&EffectDescriptor],
    ) -> Result<FilterGraph> {
        let mut graph = FilterGraph::new();
        let base_index = graph.add_input(base);
        let audio_label = mix_audio_tracks(&mut graph, audio)?;
        let has_narration = audio.iter().any(|t| t.role == AudioRole::Narration);

        let ctx = EffectContext::new(self.resolution, has_narration);
        let (video, audio) = apply_effects(
            &mut graph,
            &format!("{base_index}:v"),
            audio_label.as_deref(),
            effects,
            &ctx,
        )?;

        graph.video_out = Some(video);
        graph.audio_out = audio;
        Ok(graph)
    }
}
