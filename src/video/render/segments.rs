//! Per-image segment pre-rendering and its content-addressed cache.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};

use super::ffmpeg::command::RenderSettings;
use super::ffmpeg::compiler::util::format_time;
use super::ffmpeg::graph::{Filter, InputKind, InputSpec};
use super::timeline::{FrameRate, Resolution};
use crate::video::support::utils::fingerprint_file;

pub const HASH_FILE: &str = "prerender.hash";
const CACHE_VERSION: &str = "segments-v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionEffect {
    /// Scale and pad, no motion.
    #[default]
    None,
    Fade,
    Zoom,
    SimpleZoom,
    Pendulum,
}

impl MotionEffect {
    pub const NAMES: [&'static str; 5] = ["none", "fade", "zoom", "simplezoom", "pendulum"];

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "fade" => Ok(Self::Fade),
            "zoom" => Ok(Self::Zoom),
            "simplezoom" | "simple_zoom" => Ok(Self::SimpleZoom),
            "pendulum" | "pendulo" => Ok(Self::Pendulum),
            other => bail!(
                "unknown motion effect '{other}'; expected one of {}",
                Self::NAMES.join(", ")
            ),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Fade => "fade",
            Self::Zoom => "zoom",
            Self::SimpleZoom => "simplezoom",
            Self::Pendulum => "pendulum",
        }
    }
}

/// Everything that changes what a pre-rendered segment looks like.
#[derive(Debug, Clone)]
pub struct SegmentJob {
    pub duration: f64,
    pub motion: MotionEffect,
    pub resolution: Resolution,
    pub settings: RenderSettings,
}

impl SegmentJob {
    pub fn fps(&self) -> FrameRate {
        self.settings.fps
    }
}

/// Distinct images in first-seen order, plus each slot's index into them.
pub fn unique_images(slots: &[PathBuf]) -> (Vec<PathBuf>, Vec<usize>) {
    let mut unique: Vec<PathBuf> = Vec::new();
    let mut mapping = Vec::with_capacity(slots.len());
    for slot in slots {
        let index = match unique.iter().position(|u| u == slot) {
            Some(index) => index,
            None => {
                unique.push(slot.clone());
                unique.len() - 1
            }
        };
        mapping.push(index);
    }
    (unique, mapping)
}

/// Hash of the job parameters and the bytes of every image.
pub fn cache_key(images: &[PathBuf], job: &SegmentJob) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut line = |text: String| {
        hasher.update(text.as_bytes());
        hasher.update(b"\n");
    };

    line(CACHE_VERSION.to_string());
    line(format!("duration={}", format_time(job.duration)));
    line(format!("motion={}", job.motion.as_str()));
    line(format!("resolution={}", job.resolution));
    line(format!("fps={}", job.fps()));
    line(format!(
        "encoder={} quality={} preset={}",
        job.settings.video_codec,
        job.settings.quality,
        job.settings.preset.as_deref().unwrap_or("-")
    ));
    for image in images {
        let fingerprint = fingerprint_file(image)?;
        line(format!("image={} sha256={fingerprint}", image.display()));
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Location of one parameter set's segments under the cache root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub dir: PathBuf,
    /// Container extension of the segment files.
    pub extension: String,
}

impl CacheEntry {
    pub fn new(root: &Path, key: String, extension: &str) -> Self {
        let dir = root.join(&key);
        Self {
            key,
            dir,
            extension: extension.to_string(),
        }
    }

    pub fn segment(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("segment_{index:04}.{}", self.extension))
    }

    /// Name rendered to before the atomic rename into place.
    pub fn partial(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("segment_{index:04}.partial.{}", self.extension))
    }

    pub fn hash_file(&self) -> PathBuf {
        self.dir.join(HASH_FILE)
    }

    /// The hash file matches and all `count` segments exist.
    pub fn is_complete(&self, count: usize) -> bool {
        let stored = fs::read_to_string(self.hash_file()).unwrap_or_default();
        stored.trim() == self.key && (0..count).all(|i| self.segment(i).is_file())
    }

    /// Drop whatever a previous, different run left behind.
    pub fn reset(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir).with_context(|| {
                format!("Failed to clear stale segment cache {}", self.dir.display())
            })?;
        }
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create segment cache {}", self.dir.display()))
    }

    pub fn promote(&self, index: usize) -> Result<()> {
        let partial = self.partial(index);
        let target = self.segment(index);
        fs::rename(&partial, &target).with_context(|| {
            format!(
                "Failed to move {} into place as {}",
                partial.display(),
                target.display()
            )
        })
    }

    /// Written last, so its presence means every segment finished.
    pub fn commit(&self) -> Result<()> {
        let tmp = self.dir.join(format!("{HASH_FILE}.partial"));
        fs::write(&tmp, &self.key)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, self.hash_file())
            .with_context(|| format!("Failed to commit {}", self.hash_file().display()))
    }
}

/// `-vf` chain for one image under `job`.
pub fn motion_filter(job: &SegmentJob) -> String {
    let Resolution { width, height } = job.resolution;
    let d = job.duration;
    match job.motion {
        MotionEffect::None => Filter::ScalePad { width, height }.to_string(),
        MotionEffect::Fade => {
            let fade = (d / 2.0).min(1.0);
            format!(
                "scale={width}:{height},fade=t=in:st=0:d={f},fade=t=out:st={out}:d={f}",
                f = format_time(fade),
                out = format_time(d - fade)
            )
        }
        MotionEffect::Zoom => zoompan(job, "if(lte(on,1),1,1+0.1*on/{n})"),
        MotionEffect::SimpleZoom => zoompan(job, "1+0.1*on/{n}"),
        MotionEffect::Pendulum => pendulum(job.resolution),
    }
}

fn zoompan(job: &SegmentJob, zoom: &str) -> String {
    let Resolution { width, height } = job.resolution;
    let frames = job.fps().frames_for(job.duration);
    let zoom = zoom.replace("{n}", &frames.to_string());
    format!(
        "scale={width}:{height},zoompan=zoom='{zoom}':x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d={frames}:s={width}x{height}:fps={}",
        job.fps()
    )
}

const PENDULUM_ANGLE_DEG: f64 = 0.6;
const PENDULUM_FREQ_HZ: f64 = 0.416;
const PENDULUM_SHEAR: f64 = 0.015;
const PENDULUM_SHARPEN: f64 = 0.45;

/// Scale needed so a frame of `aspect` (h/w) rotated by `theta` still
/// covers the original frame.
fn rotation_safe_zoom(theta: f64, aspect: f64) -> f64 {
    let (c, s) = (theta.cos().abs(), theta.sin().abs());
    (c + aspect * s).max(c + s / aspect)
}

fn pendulum(resolution: Resolution) -> String {
    let Resolution { width, height } = resolution;
    let aspect = if width > 0 {
        f64::from(height) / f64::from(width)
    } else {
        9.0 / 16.0
    };
    let zoom = rotation_safe_zoom(PENDULUM_ANGLE_DEG.to_radians(), aspect) * 1.06;
    let zoom = format!("{zoom:.4}");
    let shear = format_time(PENDULUM_SHEAR);
    format!(
        "scale={width}:{height}:force_original_aspect_ratio=increase,crop={width}:{height},\
scale=iw*{zoom}:ih*{zoom}:flags=fast_bilinear,\
shear=shx={shear}:shy=-{shear},\
rotate=({angle}*PI/180)*sin(2*PI*{freq}*t):ow=iw:oh=ih:bilinear=0,\
unsharp=7:7:{amount}:7:7:0,\
crop={width}:{height},pad=ceil(iw/2)*2:ceil(ih/2)*2,setsar=1",
        angle = format_time(PENDULUM_ANGLE_DEG),
        freq = format_time(PENDULUM_FREQ_HZ),
        amount = format_time(PENDULUM_SHARPEN),
    )
}

/// ffmpeg arguments that render `image` into `output` as one segment.
pub fn segment_command(image: &Path, output: &Path, job: &SegmentJob) -> Vec<String> {
    let zooming = matches!(job.motion, MotionEffect::Zoom | MotionEffect::SimpleZoom);
    let input = if zooming {
        InputSpec::new(image, InputKind::Looped { duration: None })
    } else {
        InputSpec::new(
            image,
            InputKind::Image {
                duration: job.duration,
            },
        )
    };

    let mut args = vec!["-y".to_string(), "-hide_banner".to_string()];
    args.extend(image_input_args(&input));
    args.push("-vf".to_string());
    args.push(motion_filter(job));
    args.extend(job.settings.video_args());
    if zooming {
        args.push("-frames:v".to_string());
        args.push(job.fps().frames_for(job.duration).to_string());
    }
    if job.motion == MotionEffect::Pendulum {
        args.extend(["-threads", "0", "-filter_threads", "0"].map(String::from));
    }
    args.push("-an".to_string());
    args.extend(job.settings.muxer_args());
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Still images loop with `-loop 1`; zoompan inputs carry no `-t`.
fn image_input_args(input: &InputSpec) -> Vec<String> {
    match input.kind {
        InputKind::Looped { duration: None } => vec![
            "-loop".to_string(),
            "1".to_string(),
            "-i".to_string(),
            input.path.to_string_lossy().into_owned(),
        ],
        _ => input.args(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(motion: MotionEffect) -> SegmentJob {
        SegmentJob {
            duration: 3.0,
            motion,
            resolution: Resolution::default(),
            settings: RenderSettings::for_encoder("libx264", FrameRate::default()).unwrap(),
        }
    }

    #[test]
    fn duplicates_map_to_first_occurrence() {
        let slots: Vec<PathBuf> = ["a.png", "b.png", "a.png", "c.png", "b.png"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let (unique, mapping) = unique_images(&slots);
        assert_eq!(unique.len(), 3);
        assert_eq!(mapping, vec![0, 1, 0, 2, 1]);
    }

    #[test]
    fn static_segment_loops_for_its_duration() {
        let args = segment_command(Path::new("a.png"), Path::new("seg.mp4"), &job(MotionEffect::None));
        assert_eq!(&args[2..8], ["-loop", "1", "-t", "3", "-i", "a.png"]);
        assert!(args.contains(&"scale=1280:720:force_original_aspect_ratio=decrease,pad=1280:720:(ow-iw)/2:(oh-ih)/2".to_string()));
        assert!(args.contains(&"-an".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("seg.mp4"));
    }

    #[test]
    fn fade_is_capped_at_one_second() {
        assert_eq!(
            motion_filter(&job(MotionEffect::Fade)),
            "scale=1280:720,fade=t=in:st=0:d=1,fade=t=out:st=2:d=1"
        );
        let mut short = job(MotionEffect::Fade);
        short.duration = 1.0;
        assert!(motion_filter(&short).ends_with("fade=t=out:st=0.5:d=0.5"));
    }

    #[test]
    fn zoom_limits_frames() {
        let args = segment_command(Path::new("a.png"), Path::new("seg.mp4"), &job(MotionEffect::Zoom));
        let vf = &args[args.iter().position(|a| a == "-vf").unwrap() + 1];
        assert!(vf.contains("zoom='if(lte(on,1),1,1+0.1*on/90)'"));
        assert!(vf.contains("s=1280x720:fps=30"));
        assert!(args.windows(2).any(|w| w == ["-frames:v", "90"]));
        assert!(!args.iter().any(|a| a == "-t"));
    }

    #[test]
    fn pendulum_keeps_output_size() {
        let vf = motion_filter(&job(MotionEffect::Pendulum));
        assert!(vf.starts_with("scale=1280:720:force_original_aspect_ratio=increase,crop=1280:720"));
        assert!(vf.contains("rotate=(0.6*PI/180)*sin(2*PI*0.416*t)"));
        assert!(vf.contains(",crop=1280:720,pad=ceil(iw/2)*2"));
        assert_eq!(rotation_safe_zoom(0.0, 0.5625), 1.0);
        let tilted = rotation_safe_zoom(PENDULUM_ANGLE_DEG.to_radians(), 0.5625);
        assert!(tilted > 1.0 && tilted < 1.05);
        assert_eq!(MotionEffect::parse("Pendulo").unwrap(), MotionEffect::Pendulum);
        assert!(MotionEffect::parse("wobble").is_err());
    }

    #[test]
    fn cache_key_tracks_parameters_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("1.png");
        fs::write(&image, b"pixels").unwrap();
        let images = vec![image.clone()];

        let base = cache_key(&images, &job(MotionEffect::None)).unwrap();
        assert_eq!(base, cache_key(&images, &job(MotionEffect::None)).unwrap());
        assert_ne!(base, cache_key(&images, &job(MotionEffect::Fade)).unwrap());

        let mut longer = job(MotionEffect::None);
        longer.duration = 4.0;
        assert_ne!(base, cache_key(&images, &longer).unwrap());

        fs::write(&image, b"other pixels").unwrap();
        assert_ne!(base, cache_key(&images, &job(MotionEffect::None)).unwrap());
    }

    #[test]
    fn entry_is_complete_only_after_commit() {
        let root = tempfile::tempdir().unwrap();
        let entry = CacheEntry::new(root.path(), "abc".to_string(), "mp4");
        entry.reset().unwrap();
        fs::write(entry.partial(0), b"x").unwrap();
        entry.promote(0).unwrap();
        assert!(!entry.is_complete(1));
        entry.commit().unwrap();
        assert!(entry.is_complete(1));
        assert!(!entry.is_complete(2));
    }
}
