//! Timeline construction for narrated slideshows.
//!
//! Stills are cycled into back-to-back slots until the narration is
//! covered; overlays, chroma clips and captions become effects on the
//! first slot.

use std::path::{Path, PathBuf};

use anyhow::Result;

use super::ffmpeg::compiler::{CHROMA_OVERLAY, COVER, LOGO, OVERLAY, VOLUME};
use super::timeline::{
    CaptionTrack, Clip, EffectDescriptor, EffectTarget, FrameRate, Resolution, Timeline, Track,
    TrackKind,
};
use crate::video::captions::{CaptionSegment, CaptionStyle};
use crate::video::cli::{ChromaSlot, LayerArgs};
use crate::video::config::{OverlayConfig, ValidationReport};
use crate::video::support::ffmpeg::MediaProbe;

/// Number of slots needed to cover `narration` seconds.
///
/// With cross-fades every join eats `transition` seconds, so more slots are
/// needed; an unknown narration (0) shows every image once.
pub fn slot_count(narration: f64, segment: f64, transition: Option<f64>, images: usize) -> usize {
    if narration <= 0.0 || segment <= 0.0 {
        return images.max(1);
    }
    match transition {
        Some(t) if t > 0.0 && t < segment => {
            (((narration + t) / (segment - t)).floor() as usize + 2).max(2)
        }
        _ => (narration / segment).floor() as usize + 1,
    }
}

#[derive(Debug, Clone)]
pub struct SlideshowParams {
    pub images: Vec<PathBuf>,
    pub segment_duration: f64,
    pub narration: PathBuf,
    /// Probed length; 0 when unknown.
    pub narration_duration: f64,
    pub music: Option<PathBuf>,
    pub music_volume: f64,
    pub fps: FrameRate,
    pub resolution: Resolution,
    /// Cross-fade length when transitions are on.
    pub transition: Option<f64>,
}

pub fn slideshow_timeline(
    params: &SlideshowParams,
    effects: Vec<EffectDescriptor>,
) -> Result<Timeline> {
    let d = params.segment_duration;
    let slots = slot_count(
        params.narration_duration,
        d,
        params.transition,
        params.images.len(),
    );

    let mut clips = Vec::with_capacity(slots);
    for i in 0..slots {
        let image = &params.images[i % params.images.len()];
        clips.push(Clip::new(format!("slot{:03}", i + 1), image.clone(), 0.0, d, i as f64 * d)?);
    }
    if let Some(first) = clips.first_mut() {
        first.effects = effects;
    }

    let mut timeline = Timeline::new(params.fps, params.resolution);
    timeline.video.push(Track::new("images", TrackKind::Video, clips));

    let audio_length = if params.narration_duration > 0.0 {
        params.narration_duration
    } else {
        slots as f64 * d
    };
    timeline.audio.push(Track::new(
        "narration",
        TrackKind::Audio,
        vec![Clip::new("narration", params.narration.clone(), 0.0, audio_length, 0.0)?],
    ));

    if let Some(music) = &params.music {
        let bed = Clip::new("music", music.clone(), 0.0, audio_length, 0.0)?.with_effect(
            EffectDescriptor::new(VOLUME, EffectTarget::Audio).with("level", params.music_volume),
        );
        timeline
            .audio
            .push(Track::new("music", TrackKind::Audio, vec![bed]));
    }

    Ok(timeline)
}

/// Image layers from the command line plus overlays declared in config.
pub fn layer_effects(layers: &LayerArgs, declared: &[OverlayConfig]) -> Vec<EffectDescriptor> {
    let mut effects = Vec::new();

    for (path, opacity) in [
        (&layers.overlay1, layers.overlay1_opacity),
        (&layers.overlay2, layers.overlay2_opacity),
    ] {
        if let Some(path) = path {
            effects.push(
                EffectDescriptor::new(OVERLAY, EffectTarget::Video)
                    .with("path", path.as_path())
                    .with("opacity", opacity),
            );
        }
    }
    for overlay in declared {
        let mut effect = EffectDescriptor::new(OVERLAY, EffectTarget::Video)
            .with("path", overlay.path.as_path())
            .with("opacity", overlay.opacity);
        if let Some(position) = &overlay.position {
            effect = effect.with("position", position.as_str());
        }
        effects.push(effect);
    }

    if let Some(logo) = &layers.logo {
        let mut effect = EffectDescriptor::new(LOGO, EffectTarget::Video)
            .with("path", logo.as_path())
            .with("position", layers.logo_position.as_str())
            .with("opacity", layers.logo_opacity);
        if let Some(scale) = layers.logo_scale {
            effect = effect.with("scale", scale);
        }
        effects.push(effect);
    }

    if let Some(cover) = &layers.cover {
        effects.push(
            EffectDescriptor::new(COVER, EffectTarget::Video)
                .with("path", cover.as_path())
                .with("opacity", layers.cover_opacity)
                .with("size", layers.cover_size)
                .with("position", layers.cover_position.as_str()),
        );
    }

    effects
}

/// Chroma overlays with their probed length and audio presence.
pub fn chroma_effects(slots: &[ChromaSlot], probe: &dyn MediaProbe) -> Vec<EffectDescriptor> {
    slots
        .iter()
        .map(|slot| {
            let mut effect = EffectDescriptor::new(CHROMA_OVERLAY, EffectTarget::Both)
                .with("path", slot.path.as_path())
                .with("start", slot.start)
                .with("position", slot.position.as_str())
                .with("key", slot.key.as_str());
            if slot.path.exists() {
                let info = probe.probe(&slot.path);
                if info.duration > 0.0 {
                    effect = effect.with("duration", info.duration);
                }
                effect = effect.with("audio", info.has_audio);
            }
            effect
        })
        .collect()
}

pub fn caption_effect(segments: Vec<CaptionSegment>, style: CaptionStyle) -> Option<EffectDescriptor> {
    if segments.is_empty() {
        return None;
    }
    Some(EffectDescriptor::caption(CaptionTrack { segments, style }))
}

fn check_unit(report: &mut ValidationReport, name: &str, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        report.error(format!("{name} must be between 0 and 1, found {value}"));
    }
}

fn check_optional_file(report: &mut ValidationReport, name: &str, path: Option<&Path>) {
    if let Some(path) = path
        && !path.exists()
    {
        report.warn(format!(
            "{name} {} does not exist and will be skipped",
            path.display()
        ));
    }
}

/// Range checks on render parameters; missing optional files only warn.
pub fn check_render_params(
    layers: &LayerArgs,
    chroma: &[ChromaSlot],
    music: Option<&Path>,
    segment_duration: f64,
    music_volume: f64,
    transition_duration: Option<f64>,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    if !segment_duration.is_finite() || segment_duration <= 0.0 {
        report.error(format!(
            "segment duration must be greater than 0, found {segment_duration}"
        ));
    }
    if let Some(t) = transition_duration
        && (!t.is_finite() || t <= 0.0)
    {
        report.error(format!("transition duration must be greater than 0, found {t}"));
    }

    check_unit(&mut report, "music volume", music_volume);
    check_unit(&mut report, "logo opacity", layers.logo_opacity);
    check_unit(&mut report, "overlay1 opacity", layers.overlay1_opacity);
    check_unit(&mut report, "overlay2 opacity", layers.overlay2_opacity);
    check_unit(&mut report, "cover opacity", layers.cover_opacity);
    if let Some(scale) = layers.logo_scale
        && scale <= 0.0
    {
        report.error(format!("logo scale must be greater than 0, found {scale}"));
    }
    if layers.cover_size <= 0.0 {
        report.error(format!(
            "cover size must be greater than 0, found {}",
            layers.cover_size
        ));
    }

    check_optional_file(&mut report, "music", music);
    check_optional_file(&mut report, "logo", layers.logo.as_deref());
    check_optional_file(&mut report, "overlay1", layers.overlay1.as_deref());
    check_optional_file(&mut report, "overlay2", layers.overlay2.as_deref());
    check_optional_file(&mut report, "cover", layers.cover.as_deref());

    for slot in chroma {
        if slot.start < 0.0 {
            report.error(format!(
                "chroma{} start must be at least 0, found {}",
                slot.slot, slot.start
            ));
        }
        check_optional_file(&mut report, &format!("chroma{}", slot.slot), Some(&slot.path));
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::support::ffmpeg::MediaInfo;

    struct FixedProbe(MediaInfo);

    impl MediaProbe for FixedProbe {
        fn probe(&self, _path: &Path) -> MediaInfo {
            self.0
        }
    }

    fn params(images: usize, narration: f64, transition: Option<f64>) -> SlideshowParams {
        SlideshowParams {
            images: (1..=images).map(|i| PathBuf::from(format!("{i}.png"))).collect(),
            segment_duration: 3.0,
            narration: PathBuf::from("voice.mp3"),
            narration_duration: narration,
            music: None,
            music_volume: 0.2,
            fps: FrameRate::default(),
            resolution: Resolution::default(),
            transition,
        }
    }

    #[test]
    fn slots_cover_the_narration() {
        assert_eq!(slot_count(7.5, 3.0, None, 3), 3);
        assert_eq!(slot_count(9.0, 3.0, None, 3), 4);
        assert_eq!(slot_count(6.0, 3.0, Some(0.9), 2), 5);
        assert_eq!(slot_count(0.0, 3.0, Some(0.9), 4), 4);
    }

    #[test]
    fn stills_are_cycled_back_to_back() {
        let timeline = slideshow_timeline(&params(2, 7.5, None), Vec::new()).unwrap();
        let clips = timeline.video_clips();
        assert_eq!(clips.len(), 3);
        assert_eq!(clips[2].media_path, PathBuf::from("1.png"));
        assert_eq!(clips[2].start, 6.0);
        assert_eq!(timeline.narration().unwrap().duration(), 7.5);
        assert_eq!(timeline.background_clips().count(), 0);
    }

    #[test]
    fn music_carries_its_volume() {
        let mut p = params(1, 4.0, None);
        p.music = Some(PathBuf::from("bed.mp3"));
        p.music_volume = 0.35;
        let timeline = slideshow_timeline(&p, Vec::new()).unwrap();
        let bed = timeline.background_clips().next().unwrap();
        assert_eq!(bed.effects[0].name, VOLUME);
        assert_eq!(bed.effects[0].number("level"), Some(0.35));
    }

    #[test]
    fn effects_land_on_the_first_slot() {
        let layers = LayerArgs {
            logo: Some(PathBuf::from("logo.png")),
            logo_position: "br".to_string(),
            logo_opacity: 0.5,
            cover_size: 1.0,
            ..LayerArgs::default()
        };
        let effects = layer_effects(&layers, &[]);
        let timeline = slideshow_timeline(&params(2, 6.0, None), effects).unwrap();
        let visual: Vec<_> = timeline.visual_effects().collect();
        assert_eq!(visual.len(), 1);
        assert_eq!(visual[0].name, LOGO);
        assert_eq!(visual[0].text("position"), Some("br"));
    }

    #[test]
    fn chroma_effects_record_probe_results() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("green.mp4");
        std::fs::write(&clip, b"x").unwrap();
        let slots = vec![ChromaSlot {
            slot: 1,
            path: clip,
            start: 2.0,
            position: "center".to_string(),
            key: "green".to_string(),
        }];

        let probe = FixedProbe(MediaInfo {
            duration: 4.0,
            has_audio: true,
            ..MediaInfo::default()
        });
        let effects = chroma_effects(&slots, &probe);
        assert_eq!(effects[0].number("duration"), Some(4.0));
        assert_eq!(effects[0].flag("audio"), Some(true));

        let unknown = chroma_effects(&slots, &FixedProbe(MediaInfo::default()));
        assert_eq!(unknown[0].number("duration"), None);
        assert_eq!(unknown[0].flag("audio"), Some(false));
    }

    #[test]
    fn parameter_checks_collect_everything() {
        let layers = LayerArgs {
            logo_opacity: 1.5,
            cover_opacity: 1.0,
            overlay1_opacity: 1.0,
            overlay2_opacity: -0.1,
            cover_size: 0.0,
            logo: Some(PathBuf::from("/missing/logo.png")),
            ..LayerArgs::default()
        };
        let chroma = vec![ChromaSlot {
            slot: 3,
            path: PathBuf::from("/missing/c.mp4"),
            start: -1.0,
            position: "center".to_string(),
            key: "green".to_string(),
        }];
        let report = check_render_params(&layers, &chroma, None, 0.0, 2.0, Some(-1.0));
        assert_eq!(report.errors.len(), 7, "{:?}", report.errors);
        assert!(report.errors.iter().any(|e| e.starts_with("chroma3 start")));
        assert_eq!(report.warnings.len(), 2);
    }
}
