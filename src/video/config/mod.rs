use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::video::captions::{CaptionStyle, SegmenterConfig, validate_model_dir};
use crate::video::render::sequencer::StageTimeouts;
use crate::video::render::timeline::{FrameRate, Resolution};
use crate::video::support::utils::expand_path;

/// Output frame size as written in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Default for Dimensions {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl From<Dimensions> for Resolution {
    fn from(value: Dimensions) -> Self {
        Resolution::new(value.width, value.height)
    }
}

/// Per-invocation time budgets, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub probe: f64,
    pub segment: f64,
    pub concat: f64,
    pub batch_concat: f64,
    pub render: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            probe: 30.0,
            segment: 30.0,
            concat: 120.0,
            batch_concat: 300.0,
            render: 600.0,
        }
    }
}

impl TimeoutConfig {
    pub fn stage_timeouts(&self) -> StageTimeouts {
        StageTimeouts {
            probe: Duration::from_secs_f64(self.probe),
            segment: Duration::from_secs_f64(self.segment),
            concat: Duration::from_secs_f64(self.concat),
            batch_concat: Duration::from_secs_f64(self.batch_concat),
            render: Duration::from_secs_f64(self.render),
        }
    }

    fn sanitize(&mut self) {
        let defaults = Self::default();
        for (value, default) in [
            (&mut self.probe, defaults.probe),
            (&mut self.segment, defaults.segment),
            (&mut self.concat, defaults.concat),
            (&mut self.batch_concat, defaults.batch_concat),
            (&mut self.render, defaults.render),
        ] {
            if !value.is_finite() || *value <= 0.0 {
                *value = default;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleConfig {
    pub enabled: bool,
    /// Recognizer model directory (`am`, `conf`, `graph`).
    pub model_path: Option<PathBuf>,
    /// Recognizer runs below this mean confidence are dropped whole.
    pub confidence_threshold: f64,
    /// Seconds.
    pub max_segment_duration: f64,
    pub style: CaptionStyle,
    pub presets: BTreeMap<String, CaptionStyle>,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model_path: None,
            confidence_threshold: 0.5,
            max_segment_duration: 4.0,
            style: CaptionStyle::default(),
            presets: BTreeMap::new(),
        }
    }
}

impl SubtitleConfig {
    /// Base style, optionally replaced by a named preset.
    pub fn style_for(&self, preset: Option<&str>) -> Result<CaptionStyle> {
        let Some(name) = preset else {
            return Ok(self.style.clone());
        };
        match self.presets.get(name) {
            Some(style) => Ok(style.clone()),
            None => {
                let known: Vec<&str> = self.presets.keys().map(String::as_str).collect();
                if known.is_empty() {
                    bail!("caption preset '{name}' not found; the config defines no presets");
                }
                bail!(
                    "caption preset '{name}' not found; available: {}",
                    known.join(", ")
                )
            }
        }
    }

    pub fn segmenter(&self, style: &CaptionStyle) -> SegmenterConfig {
        SegmenterConfig {
            max_duration_secs: self.max_segment_duration,
            max_chars: style.max_chars_per_line,
            max_words: style.max_words_per_line,
        }
    }
}

/// An overlay image declared in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayConfig {
    pub path: PathBuf,
    #[serde(default = "OverlayConfig::default_opacity")]
    pub opacity: f64,
    #[serde(default)]
    pub position: Option<String>,
}

impl OverlayConfig {
    fn default_opacity() -> f64 {
        1.0
    }
}

/// Project-wide settings. Every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Seconds each still is shown.
    pub segment_duration: f64,
    pub image_source_dir: PathBuf,
    pub resolution: Dimensions,
    pub fps: u32,
    pub encoder: String,
    pub max_inputs_per_batch: usize,
    pub background_music_volume: f64,
    pub cache_dir: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub timeouts: TimeoutConfig,
    pub subtitles: SubtitleConfig,
    pub overlays: Vec<OverlayConfig>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            segment_duration: Self::DEFAULT_SEGMENT_DURATION,
            image_source_dir: PathBuf::from("./images"),
            resolution: Dimensions::default(),
            fps: 30,
            encoder: "libx264".to_string(),
            max_inputs_per_batch: 10,
            background_music_volume: Self::DEFAULT_MUSIC_VOLUME,
            cache_dir: None,
            ffmpeg_path: None,
            ffprobe_path: None,
            timeouts: TimeoutConfig::default(),
            subtitles: SubtitleConfig::default(),
            overlays: Vec::new(),
        }
    }
}

impl ProjectConfig {
    pub const DEFAULT_SEGMENT_DURATION: f64 = 3.0;
    pub const DEFAULT_MUSIC_VOLUME: f64 = 0.2;

    /// Defaults when `path` is `None`.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::default()),
        }
    }

    /// Read a JSON document, or TOML when the extension is `.toml`.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading project config from {}", path.display()))?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let mut config: Self = if is_toml {
            toml::from_str(&contents)
                .with_context(|| format!("parsing TOML config {}", path.display()))?
        } else {
            serde_json::from_str(&contents)
                .with_context(|| format!("parsing JSON config {}", path.display()))?
        };

        config.sanitize();
        config.expand_paths();
        Ok(config)
    }

    /// Replace non-finite or negative numbers with their defaults.
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if !self.segment_duration.is_finite() || self.segment_duration < 0.0 {
            self.segment_duration = defaults.segment_duration;
        }
        if !self.background_music_volume.is_finite() || self.background_music_volume < 0.0 {
            self.background_music_volume = defaults.background_music_volume;
        }
        if self.fps == 0 {
            self.fps = defaults.fps;
        }
        if self.max_inputs_per_batch == 0 {
            self.max_inputs_per_batch = defaults.max_inputs_per_batch;
        }

        let subtitles = &mut self.subtitles;
        let subtitle_defaults = SubtitleConfig::default();
        if !subtitles.confidence_threshold.is_finite() || subtitles.confidence_threshold < 0.0 {
            subtitles.confidence_threshold = subtitle_defaults.confidence_threshold;
        }
        if !subtitles.max_segment_duration.is_finite() || subtitles.max_segment_duration < 0.0 {
            subtitles.max_segment_duration = subtitle_defaults.max_segment_duration;
        }

        for overlay in &mut self.overlays {
            if !overlay.opacity.is_finite() || overlay.opacity < 0.0 {
                overlay.opacity = OverlayConfig::default_opacity();
            }
        }

        self.timeouts.sanitize();
    }

    fn expand_paths(&mut self) {
        let expand = |path: &Path| expand_path(&path.to_string_lossy());
        self.image_source_dir = expand(&self.image_source_dir);
        for path in [
            &mut self.cache_dir,
            &mut self.ffmpeg_path,
            &mut self.ffprobe_path,
            &mut self.subtitles.model_path,
        ]
        .into_iter()
        .flatten()
        {
            *path = expand(path);
        }
        for overlay in &mut self.overlays {
            overlay.path = expand(&overlay.path);
        }
    }

    pub fn frame_rate(&self) -> FrameRate {
        FrameRate::new(self.fps, 1)
    }

    /// Where pre-rendered segments are kept.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("reelsmith")
                .join("segments")
        })
    }

    /// Every problem with this config. Missing overlay files only warn.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        let subtitles = &self.subtitles;

        if !(0.0..=1.0).contains(&subtitles.confidence_threshold) {
            report.error(format!(
                "subtitles.confidence_threshold must be between 0 and 1, found {}",
                subtitles.confidence_threshold
            ));
        }
        if !(0.5..=30.0).contains(&subtitles.max_segment_duration) {
            report.error(format!(
                "subtitles.max_segment_duration must be between 0.5 and 30 seconds, found {}",
                subtitles.max_segment_duration
            ));
        }
        report.errors.extend(subtitles.style.validate("subtitles.style"));
        for (name, preset) in &subtitles.presets {
            report.errors.extend(preset.validate(&format!("presets.{name}")));
        }
        if subtitles.enabled {
            match &subtitles.model_path {
                Some(dir) => report.errors.extend(validate_model_dir(dir)),
                None => report.warn(
                    "subtitles.enabled is set without subtitles.model_path; a transcript or SRT must be given per render",
                ),
            }
        }

        if self.segment_duration <= 0.0 {
            report.error(format!(
                "segment_duration must be greater than 0, found {}",
                self.segment_duration
            ));
        }
        if !(0.0..=1.0).contains(&self.background_music_volume) {
            report.error(format!(
                "background_music_volume must be between 0 and 1, found {}",
                self.background_music_volume
            ));
        }
        if self.resolution.width == 0 || self.resolution.height == 0 {
            report.error(format!(
                "resolution must be non-zero, found {}x{}",
                self.resolution.width, self.resolution.height
            ));
        }

        for (i, overlay) in self.overlays.iter().enumerate() {
            if !(0.0..=1.0).contains(&overlay.opacity) {
                report.error(format!(
                    "overlays[{i}].opacity must be between 0 and 1, found {}",
                    overlay.opacity
                ));
            }
            if !overlay.path.exists() {
                report.warn(format!(
                    "overlays[{i}].path {} does not exist and will be skipped",
                    overlay.path.display()
                ));
            }
        }

        report
    }
}

/// Outcome of a validation pass: errors block a render, warnings do not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{}").unwrap();
        let config = ProjectConfig::load_from_path(&path).unwrap();
        assert_eq!(config.segment_duration, 3.0);
        assert_eq!(config.resolution, Dimensions { width: 1280, height: 720 });
        assert_eq!(config.encoder, "libx264");
        assert_eq!(config.timeouts.stage_timeouts(), StageTimeouts::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_is_chosen_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.toml");
        fs::write(
            &path,
            "segment_duration = 4.5\nfps = 25\n\n[resolution]\nwidth = 1080\nheight = 1920\n\n[subtitles.presets.loud]\nfont_size = 48\n",
        )
        .unwrap();
        let config = ProjectConfig::load_from_path(&path).unwrap();
        assert_eq!(config.segment_duration, 4.5);
        assert_eq!(config.frame_rate(), FrameRate::new(25, 1));
        assert_eq!(Resolution::from(config.resolution), Resolution::new(1080, 1920));
        let loud = config.subtitles.style_for(Some("loud")).unwrap();
        assert_eq!(loud.font_size, 48);
        assert_eq!(loud.font_color, "white");
    }

    #[test]
    fn negative_numbers_fall_back_to_defaults() {
        let mut config: ProjectConfig = serde_json::from_str(
            r#"{"segment_duration": -1, "background_music_volume": -0.5,
                "timeouts": {"render": -5}, "subtitles": {"confidence_threshold": -2}}"#,
        )
        .unwrap();
        config.sanitize();
        assert_eq!(config.segment_duration, 3.0);
        assert_eq!(config.background_music_volume, 0.2);
        assert_eq!(config.timeouts.render, 600.0);
        assert_eq!(config.subtitles.confidence_threshold, 0.5);
    }

    #[test]
    fn validation_lists_every_problem() {
        let mut config = ProjectConfig::default();
        config.subtitles.confidence_threshold = 1.5;
        config.subtitles.max_segment_duration = 0.1;
        config.background_music_volume = 3.0;
        config.subtitles.presets.insert(
            "tiny".to_string(),
            CaptionStyle {
                font_size: 2,
                ..CaptionStyle::default()
            },
        );
        config.overlays.push(OverlayConfig {
            path: PathBuf::from("/missing/overlay.png"),
            opacity: 2.0,
            position: None,
        });

        let report = config.validate();
        assert_eq!(report.errors.len(), 5, "{:?}", report.errors);
        assert!(report.errors.iter().any(|e| e.starts_with("presets.tiny.font_size")));
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn enabled_captions_check_the_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProjectConfig::default();
        config.subtitles.enabled = true;
        config.subtitles.model_path = Some(dir.path().to_path_buf());
        assert_eq!(config.validate().errors.len(), 3);
    }

    #[test]
    fn unknown_preset_names_the_known_ones() {
        let mut subtitles = SubtitleConfig::default();
        subtitles
            .presets
            .insert("calm".to_string(), CaptionStyle::default());
        let err = subtitles.style_for(Some("loud")).unwrap_err();
        assert!(err.to_string().contains("calm"));
        assert_eq!(subtitles.style_for(None).unwrap(), CaptionStyle::default());
    }

    #[test]
    fn invalid_json_reports_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let err = ProjectConfig::load_from_path(&path).unwrap_err();
        assert!(format!("{err:#}").contains("broken.json"));
    }
}
