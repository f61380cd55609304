//! Render timeline
//!
//! Value objects describing one render request: tracks of clips, each clip
//! carrying the effects attached to it. Built once per request and treated as
//! read-only by the graph compiler and the sequencer.
//!
//! Times are seconds (`f64`); caption spans keep their millisecond precision.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use crate::video::captions::{CaptionSegment, CaptionStyle};

/// Rational frame rate, e.g. 30/1 or 30000/1001.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Self {
        Self {
            num,
            den: den.max(1),
        }
    }

    pub fn as_f64(&self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Whole frames per second, rounded; used for GOP sizes.
    pub fn rounded(&self) -> u32 {
        self.as_f64().round() as u32
    }

    pub fn frames_for(&self, seconds: f64) -> u64 {
        (seconds * self.as_f64()).floor().max(1.0) as u64
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::new(30, 1)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EffectTarget {
    #[default]
    Video,
    Audio,
    Both,
}

/// Primitive effect parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Text(String),
    Number(f64),
    Flag(bool),
    Path(PathBuf),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Flag(value)
    }
}

impl From<PathBuf> for ParamValue {
    fn from(value: PathBuf) -> Self {
        ParamValue::Path(value)
    }
}

impl From<&Path> for ParamValue {
    fn from(value: &Path) -> Self {
        ParamValue::Path(value.to_path_buf())
    }
}

/// Caption spans and their style, attached to a caption effect.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptionTrack {
    pub segments: Vec<CaptionSegment>,
    pub style: CaptionStyle,
}

/// An effect attached to a clip.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectDescriptor {
    /// `logo`, `overlay`, `chroma_overlay`, `cover`, `caption`, `volume`, or a transition name.
    pub name: String,
    pub params: BTreeMap<String, ParamValue>,
    pub target: EffectTarget,
    /// Only set for caption effects.
    pub captions: Option<CaptionTrack>,
}

impl EffectDescriptor {
    pub fn new(name: impl Into<String>, target: EffectTarget) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
            target,
            captions: None,
        }
    }

    pub fn caption(track: CaptionTrack) -> Self {
        Self {
            captions: Some(track),
            ..Self::new("caption", EffectTarget::Video)
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.params.get(key)? {
            ParamValue::Number(v) => Some(*v),
            ParamValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn number_or(&self, key: &str, default: f64) -> f64 {
        self.number(key).filter(|v| v.is_finite()).unwrap_or(default)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.params.get(key)? {
            ParamValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.params.get(key)? {
            ParamValue::Flag(b) => Some(*b),
            ParamValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn path(&self, key: &str) -> Option<&Path> {
        match self.params.get(key)? {
            ParamValue::Path(p) => Some(p.as_path()),
            ParamValue::Text(s) => Some(Path::new(s)),
            _ => None,
        }
    }
}

/// A placed piece of media on a track.
#[derive(Clone, Debug, PartialEq)]
pub struct Clip {
    pub id: String,
    pub media_path: PathBuf,
    /// Trim window inside the source, seconds.
    pub in_point: f64,
    pub out_point: f64,
    /// Placement on the track, seconds.
    pub start: f64,
    pub effects: Vec<EffectDescriptor>,
}

impl Clip {
    pub fn new(
        id: impl Into<String>,
        media_path: impl Into<PathBuf>,
        in_point: f64,
        out_point: f64,
        start: f64,
    ) -> Result<Self> {
        let id = id.into();
        if !(in_point >= 0.0 && out_point > in_point && start >= 0.0) {
            bail!(
                "clip '{id}' has an invalid window: in={in_point} out={out_point} start={start}"
            );
        }
        Ok(Self {
            id,
            media_path: media_path.into(),
            in_point,
            out_point,
            start,
            effects: Vec::new(),
        })
    }

    pub fn duration(&self) -> f64 {
        self.out_point - self.in_point
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration()
    }

    pub fn with_effect(mut self, effect: EffectDescriptor) -> Self {
        self.effects.push(effect);
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: String,
    pub kind: TrackKind,
    pub clips: Vec<Clip>,
}

impl Track {
    pub fn new(id: impl Into<String>, kind: TrackKind, clips: Vec<Clip>) -> Self {
        Self {
            id: id.into(),
            kind,
            clips,
        }
    }
}

/// Audio track 0 is narration by convention; track 1 onward is background.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Timeline {
    pub fps: FrameRate,
    pub resolution: Resolution,
    pub video: Vec<Track>,
    pub audio: Vec<Track>,
}

impl Timeline {
    pub fn new(fps: FrameRate, resolution: Resolution) -> Self {
        Self {
            fps,
            resolution,
            video: Vec::new(),
            audio: Vec::new(),
        }
    }

    /// Clips of the main (first) video track.
    pub fn video_clips(&self) -> &[Clip] {
        self.video.first().map(|t| t.clips.as_slice()).unwrap_or(&[])
    }

    pub fn narration(&self) -> Option<&Clip> {
        self.audio.first().and_then(|t| t.clips.first())
    }

    pub fn background_clips(&self) -> impl Iterator<Item = &Clip> {
        self.audio.iter().skip(1).flat_map(|t| t.clips.iter())
    }

    /// Effects attached to video clips, in clip order.
    pub fn visual_effects(&self) -> impl Iterator<Item = &EffectDescriptor> {
        self.video
            .iter()
            .flat_map(|t| t.clips.iter())
            .flat_map(|c| c.effects.iter())
            .filter(|e| e.target != EffectTarget::Audio)
    }

    /// A render needs at least one video clip.
    pub fn ensure_renderable(&self) -> Result<()> {
        if self.video_clips().is_empty() {
            bail!("timeline has no video clips to render");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_rejects_inverted_window() {
        assert!(Clip::new("a", "a.png", 2.0, 1.0, 0.0).is_err());
        assert!(Clip::new("a", "a.png", -1.0, 1.0, 0.0).is_err());
        let clip = Clip::new("a", "a.png", 0.5, 3.5, 6.0).unwrap();
        assert_eq!(clip.duration(), 3.0);
        assert_eq!(clip.end(), 9.0);
    }

    #[test]
    fn effect_params_coerce_text() {
        let effect = EffectDescriptor::new("logo", EffectTarget::Video)
            .with("opacity", "0.5")
            .with("scale", 0.2)
            .with("path", PathBuf::from("logo.png"));
        assert_eq!(effect.number("opacity"), Some(0.5));
        assert_eq!(effect.number_or("scale", 1.0), 0.2);
        assert_eq!(effect.number_or("missing", 1.0), 1.0);
        assert_eq!(effect.path("path"), Some(Path::new("logo.png")));
        assert_eq!(effect.text("path"), None);
    }

    #[test]
    fn narration_is_first_audio_track() {
        let mut timeline = Timeline::default();
        timeline.audio.push(Track::new(
            "narration",
            TrackKind::Audio,
            vec![Clip::new("n", "voice.mp3", 0.0, 7.5, 0.0).unwrap()],
        ));
        timeline.audio.push(Track::new(
            "music",
            TrackKind::Audio,
            vec![Clip::new("m", "song.mp3", 0.0, 7.5, 0.0).unwrap()],
        ));
        assert_eq!(timeline.narration().unwrap().id, "n");
        assert_eq!(timeline.background_clips().count(), 1);
        assert!(timeline.ensure_renderable().is_err());
    }

    #[test]
    fn frame_rate_display_and_frames() {
        assert_eq!(FrameRate::default().to_string(), "30");
        assert_eq!(FrameRate::new(30000, 1001).to_string(), "30000/1001");
        assert_eq!(FrameRate::default().frames_for(3.0), 90);
    }
}
