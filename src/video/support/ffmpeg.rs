use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::process::{drain, spawn_in_group, wait_with_timeout};
use crate::ui::prelude::{Level, emit};
use crate::video::render::RenderError;

/// Duration reported when probing fails; callers treat it as unknown.
pub const FALLBACK_DURATION: f64 = 0.0;
pub const FALLBACK_RESOLUTION: (u32, u32) = (1280, 720);

/// Explicit path when it exists, otherwise `name` looked up on PATH.
///
/// Falls back to the bare name so spawning reports the problem.
pub fn resolve_tool(explicit: Option<&Path>, name: &str) -> PathBuf {
    if let Some(path) = explicit {
        if path.exists() {
            return path.to_path_buf();
        }
        emit(
            Level::Warn,
            "video.tool.missing",
            &format!(
                "{} does not exist; looking up {name} on PATH instead",
                path.display()
            ),
            None,
        );
    }
    which::which(name).unwrap_or_else(|_| PathBuf::from(name))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub has_audio: bool,
}

impl Default for MediaInfo {
    fn default() -> Self {
        Self {
            duration: FALLBACK_DURATION,
            width: FALLBACK_RESOLUTION.0,
            height: FALLBACK_RESOLUTION.1,
            has_audio: false,
        }
    }
}

/// Duration/resolution queries. Never fails: unknown values come back as
/// the documented fallbacks.
pub trait MediaProbe {
    fn probe(&self, path: &Path) -> MediaInfo;

    fn duration(&self, path: &Path) -> f64 {
        self.probe(path).duration
    }

    fn resolution(&self, path: &Path) -> (u32, u32) {
        let info = self.probe(path);
        (info.width, info.height)
    }
}

#[derive(Debug, Deserialize, Default)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

/// Interpret `ffprobe -of json` output, filling gaps with fallbacks.
pub fn parse_probe_json(json: &str) -> Result<MediaInfo> {
    let parsed: ProbeOutput =
        serde_json::from_str(json).context("ffprobe returned invalid JSON")?;
    let mut info = MediaInfo::default();

    if let Some(duration) = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
    {
        info.duration = duration;
    }

    if let Some(stream) = parsed
        .streams
        .iter()
        .find(|s| s.width.is_some() && s.height.is_some())
        && let (Some(w), Some(h)) = (stream.width, stream.height)
        && w > 0
        && h > 0
    {
        info.width = w;
        info.height = h;
    }

    info.has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));
    Ok(info)
}

#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: PathBuf,
    timeout: Duration,
}

impl FfprobeProbe {
    pub fn new(program: PathBuf, timeout: Duration) -> Self {
        Self { program, timeout }
    }

    fn try_probe(&self, path: &Path) -> Result<MediaInfo> {
        let mut command = Command::new(&self.program);
        command
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration:stream=codec_type,width,height",
                "-of",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = spawn_in_group(&mut command, "ffprobe")?;
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = wait_with_timeout(&mut child, self.timeout)?;
        let stdout = stdout
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        let stderr = stderr
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        let Some(status) = status else {
            return Err(RenderError::Timeout {
                tool: "ffprobe".to_string(),
                stage: "probe".to_string(),
                seconds: self.timeout.as_secs(),
            }
            .into());
        };
        if !status.success() {
            return Err(RenderError::ToolFailed {
                tool: "ffprobe".to_string(),
                stage: "probe".to_string(),
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            }
            .into());
        }

        parse_probe_json(&String::from_utf8_lossy(&stdout))
    }
}

impl MediaProbe for FfprobeProbe {
    fn probe(&self, path: &Path) -> MediaInfo {
        match self.try_probe(path) {
            Ok(info) => info,
            Err(err) => {
                emit(
                    Level::Debug,
                    "video.probe.fallback",
                    &format!("Probing {} failed, using fallbacks: {err:#}", path.display()),
                    None,
                );
                MediaInfo::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration_and_first_sized_stream() {
        let json = r#"{
            "streams": [
                {"codec_type": "audio"},
                {"codec_type": "video", "width": 1080, "height": 1920}
            ],
            "format": {"duration": "12.480000"}
        }"#;
        let info = parse_probe_json(json).unwrap();
        assert_eq!(info.duration, 12.48);
        assert_eq!((info.width, info.height), (1080, 1920));
        assert!(info.has_audio);
    }

    #[test]
    fn missing_fields_use_fallbacks() {
        let info = parse_probe_json(r#"{"format": {"duration": "N/A"}}"#).unwrap();
        assert_eq!(info, MediaInfo::default());
        assert_eq!((info.width, info.height), (1280, 720));
    }

    #[test]
    fn missing_binary_yields_fallbacks() {
        let probe = FfprobeProbe::new(
            PathBuf::from("/nonexistent/ffprobe-binary"),
            Duration::from_secs(5),
        );
        assert_eq!(probe.probe(Path::new("clip.mp4")), MediaInfo::default());
        assert_eq!(probe.duration(Path::new("clip.mp4")), 0.0);
    }

    #[test]
    fn resolve_tool_falls_back_to_bare_name() {
        let resolved = resolve_tool(None, "definitely-not-a-real-tool-xyz");
        assert_eq!(resolved, PathBuf::from("definitely-not-a-real-tool-xyz"));
    }
}
