//! Translation of a finished [`FilterGraph`] into an ffmpeg argument vector.

use std::path::Path;

use anyhow::{Result, bail};

use super::compiler::util::format_time;
use super::graph::{FilterGraph, map_arg};
use crate::video::render::timeline::FrameRate;

pub const ENCODERS: [&str; 6] = [
    "libx264",
    "h264_nvenc",
    "h264_qsv",
    "h264_amf",
    "libvpx",
    "libvpx-vp9",
];

/// Encoders grouped by the quality knob they expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderFamily {
    /// `-crf`
    X264,
    /// `-rc constqp -qp`
    Nvenc,
    /// `-global_quality`
    Qsv,
    /// `-rc cqp -qp_i/-qp_p`
    Amf,
    /// `-crf` bounded by `-b:v`
    Vpx,
}

impl EncoderFamily {
    pub fn of(codec: &str) -> Option<Self> {
        match codec {
            "libx264" => Some(Self::X264),
            "h264_nvenc" => Some(Self::Nvenc),
            "h264_qsv" => Some(Self::Qsv),
            "h264_amf" => Some(Self::Amf),
            "libvpx" | "libvpx-vp9" => Some(Self::Vpx),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub container: String,
    pub video_codec: String,
    pub audio_codec: String,
    /// CRF or constant-QP value, depending on the family.
    pub quality: u32,
    pub preset: Option<String>,
    pub audio_bitrate: String,
    /// Passed as `-hwaccel` before the inputs.
    pub hwaccel: Option<String>,
    pub fps: FrameRate,
}

impl RenderSettings {
    pub fn for_encoder(encoder: &str, fps: FrameRate) -> Result<Self> {
        let encoder = encoder.trim();
        let Some(family) = EncoderFamily::of(encoder) else {
            bail!(
                "unsupported encoder '{encoder}'; expected one of {}",
                ENCODERS.join(", ")
            );
        };

        let (quality, preset, hwaccel) = match family {
            EncoderFamily::X264 => (26, Some("veryfast"), None),
            EncoderFamily::Nvenc => (23, Some("p5"), Some("cuda")),
            EncoderFamily::Qsv => (23, None, None),
            EncoderFamily::Amf => (23, Some("speed"), None),
            EncoderFamily::Vpx => (33, None, None),
        };

        let (container, audio_codec) = match family {
            EncoderFamily::Vpx => ("webm", "libopus"),
            _ => ("mp4", "aac"),
        };

        Ok(Self {
            container: container.to_string(),
            video_codec: encoder.to_string(),
            audio_codec: audio_codec.to_string(),
            quality,
            preset: preset.map(str::to_string),
            audio_bitrate: "192k".to_string(),
            hwaccel: hwaccel.map(str::to_string),
            fps,
        })
    }

    pub fn family(&self) -> Option<EncoderFamily> {
        EncoderFamily::of(&self.video_codec)
    }

    /// Codec, quality, GOP, frame rate and pixel format flags.
    pub fn video_args(&self) -> Vec<String> {
        let quality = self.quality.to_string();
        let mut args = vec!["-c:v".to_string(), self.video_codec.clone()];
        let mut push = |flag: &str, value: &str| {
            args.push(flag.to_string());
            args.push(value.to_string());
        };

        match self.family() {
            Some(EncoderFamily::X264) => {
                push("-preset", self.preset.as_deref().unwrap_or("veryfast"));
                push("-tune", "stillimage");
                push("-crf", &quality);
            }
            Some(EncoderFamily::Nvenc) => {
                push("-preset", self.preset.as_deref().unwrap_or("p5"));
                push("-rc", "constqp");
                push("-qp", &quality);
                push("-bf", "2");
            }
            Some(EncoderFamily::Qsv) => {
                push("-global_quality", &quality);
                push("-look_ahead", "0");
            }
            Some(EncoderFamily::Amf) => {
                push("-quality", self.preset.as_deref().unwrap_or("speed"));
                push("-rc", "cqp");
                push("-qp_i", &quality);
                push("-qp_p", &quality);
            }
            Some(EncoderFamily::Vpx) => {
                push("-crf", &quality);
                push("-b:v", "2M");
            }
            None => {}
        }

        push("-g", &(self.fps.rounded().max(1) * 2).to_string());
        push("-r", &self.fps.to_string());
        push("-pix_fmt", "yuv420p");
        args
    }

    /// `-c:a`/`-b:a`, or `-an` when the output carries no audio.
    pub fn audio_args(&self, has_audio: bool) -> Vec<String> {
        if has_audio {
            vec![
                "-c:a".to_string(),
                self.audio_codec.clone(),
                "-b:a".to_string(),
                self.audio_bitrate.clone(),
            ]
        } else {
            vec!["-an".to_string()]
        }
    }

    /// `+faststart` for the ISO-BMFF containers; WebM has no such layout.
    pub fn muxer_args(&self) -> Vec<String> {
        match self.container.as_str() {
            "mp4" | "mov" | "m4v" => vec!["-movflags".to_string(), "+faststart".to_string()],
            _ => Vec::new(),
        }
    }

    /// Flags that go before the first `-i`.
    pub fn input_prefix(&self) -> Vec<String> {
        match &self.hwaccel {
            Some(accel) => vec!["-hwaccel".to_string(), accel.clone()],
            None => Vec::new(),
        }
    }
}

/// Full argument vector (without the program name) for one invocation.
///
/// With no stages the raw `0:v` and `graph.audio_out` are mapped directly
/// and `-filter_complex` is left out.
pub fn build_command(
    graph: &FilterGraph,
    output: &Path,
    settings: &RenderSettings,
) -> Result<Vec<String>> {
    if graph.inputs().is_empty() {
        bail!("cannot build a command without inputs");
    }

    let mut args = vec!["-y".to_string(), "-hide_banner".to_string()];
    args.extend(settings.input_prefix());
    for input in graph.inputs() {
        args.extend(input.args());
    }

    if let Some(filter_complex) = graph.serialize() {
        args.push("-filter_complex".to_string());
        args.push(filter_complex);
    }

    let video = graph.video_out.as_deref().unwrap_or("0:v");
    args.push("-map".to_string());
    args.push(map_arg(video));
    if let Some(audio) = &graph.audio_out {
        args.push("-map".to_string());
        args.push(map_arg(audio));
    }

    args.extend(settings.video_args());
    args.extend(settings.audio_args(graph.audio_out.is_some()));

    if let Some(duration) = graph.max_duration.filter(|d| *d > 0.0) {
        args.push("-t".to_string());
        args.push(format_time(duration));
    }

    args.extend(settings.muxer_args());
    args.push(output.to_string_lossy().into_owned());
    Ok(args)
}

/// Remux `graph`'s first input into `output` without re-encoding.
///
/// Every input must already share codec parameters, as the batch outputs of
/// one render do.
pub fn stream_copy_command(
    graph: &FilterGraph,
    output: &Path,
    settings: &RenderSettings,
) -> Result<Vec<String>> {
    if graph.inputs().is_empty() {
        bail!("cannot build a command without inputs");
    }

    let mut args = vec!["-y".to_string(), "-hide_banner".to_string()];
    for input in graph.inputs() {
        args.extend(input.args());
    }
    args.extend(["-map", "0:v", "-c", "copy"].map(String::from));
    args.extend(settings.muxer_args());
    args.push(output.to_string_lossy().into_owned());
    Ok(args)
}
