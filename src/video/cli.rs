use clap::{Args, Subcommand, ValueHint};
use std::path::PathBuf;

#[allow(clippy::large_enum_variant)]
#[derive(Subcommand, Debug, Clone)]
pub enum VideoCommands {
    /// Assemble narration, stills and overlays into a finished video
    Render(RenderArgs),
    /// Turn a recognizer transcript (or SRT) into caption cues
    Captions(CaptionsArgs),
    /// Check a project config and report every problem
    Validate(ValidateArgs),
    /// Show a media file's duration and resolution as the renderer sees them
    Probe(ProbeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    /// Narration audio; its length sets the video length
    #[arg(short = 'a', long, value_hint = ValueHint::FilePath)]
    pub audio: PathBuf,

    /// Output file; defaults to output.<container> in the working directory
    #[arg(short = 'o', long, value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Stills in display order (overrides image discovery)
    #[arg(short = 'i', long, num_args = 1.., value_hint = ValueHint::FilePath)]
    pub images: Vec<PathBuf>,

    /// Directory with numbered stills (1.png, 2.jpg, ...)
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub image_dir: Option<PathBuf>,

    /// Project config (JSON, or TOML by extension)
    #[arg(short = 'c', long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Video encoder (libx264, h264_nvenc, h264_qsv, h264_amf, libvpx, libvpx-vp9)
    #[arg(long)]
    pub encoder: Option<String>,

    /// Transition between stills: none, random, fade, smoothleft, circleopen, zoomin, fadeblack
    #[arg(long, default_value = "none")]
    pub transition: String,

    /// Transition length in seconds (at most 1.0 and below the segment duration)
    #[arg(long, value_name = "SECONDS")]
    pub transition_duration: Option<f64>,

    /// Per-image motion: none, fade, zoom, simplezoom, pendulum
    #[arg(long = "effect", default_value = "none")]
    pub motion: String,

    /// Seconds each still is shown
    #[arg(long, value_name = "SECONDS")]
    pub segment_duration: Option<f64>,

    /// Seed for random transitions
    #[arg(long)]
    pub seed: Option<u64>,

    #[command(flatten)]
    pub music: MusicArgs,

    #[command(flatten)]
    pub layers: LayerArgs,

    #[command(flatten)]
    pub chroma: ChromaArgs,

    #[command(flatten)]
    pub captions: CaptionArgs,

    /// Most segments joined by a single ffmpeg invocation
    #[arg(long)]
    pub max_inputs_per_batch: Option<usize>,

    /// ffmpeg executable
    #[arg(long, value_hint = ValueHint::ExecutablePath)]
    pub ffmpeg: Option<PathBuf>,

    /// ffprobe executable
    #[arg(long, value_hint = ValueHint::ExecutablePath)]
    pub ffprobe: Option<PathBuf>,

    /// Print the planned ffmpeg commands without running them
    #[arg(long)]
    pub dry_run: bool,

    /// Overwrite an existing output file
    #[arg(long)]
    pub force: bool,

    /// Show raw ffmpeg output instead of a progress bar
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct MusicArgs {
    /// Background music, looped under the narration
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub music: Option<PathBuf>,

    /// Background music level (0.0-1.0)
    #[arg(long)]
    pub music_volume: Option<f64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct LayerArgs {
    /// Logo image
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub logo: Option<PathBuf>,
    #[arg(long, default_value = "top_left")]
    pub logo_position: String,
    #[arg(long, default_value_t = 1.0)]
    pub logo_opacity: f64,
    /// Logo width as a fraction of the output width
    #[arg(long)]
    pub logo_scale: Option<f64>,

    /// Full-frame overlay image
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub overlay1: Option<PathBuf>,
    #[arg(long, default_value_t = 1.0)]
    pub overlay1_opacity: f64,

    /// Second full-frame overlay image
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub overlay2: Option<PathBuf>,
    #[arg(long, default_value_t = 1.0)]
    pub overlay2_opacity: f64,

    /// Cover image
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub cover: Option<PathBuf>,
    #[arg(long, default_value_t = 1.0)]
    pub cover_opacity: f64,
    /// Cover size as a fraction of the output frame
    #[arg(long, default_value_t = 1.0)]
    pub cover_size: f64,
    #[arg(long, default_value = "center")]
    pub cover_position: String,
}

/// Five chroma-key overlay slots.
#[derive(Args, Debug, Clone, Default)]
pub struct ChromaArgs {
    /// Chroma-key video for slot 1
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub chroma1: Option<PathBuf>,
    #[arg(long, default_value_t = 0.0)]
    pub chroma1_start: f64,
    #[arg(long, default_value = "bottom_center")]
    pub chroma1_position: String,
    #[arg(long, default_value = "green")]
    pub chroma1_key: String,

    /// Chroma-key video for slot 2
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub chroma2: Option<PathBuf>,
    #[arg(long, default_value_t = 0.0)]
    pub chroma2_start: f64,
    #[arg(long, default_value = "bottom_center")]
    pub chroma2_position: String,
    #[arg(long, default_value = "green")]
    pub chroma2_key: String,

    /// Chroma-key video for slot 3
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub chroma3: Option<PathBuf>,
    #[arg(long, default_value_t = 0.0)]
    pub chroma3_start: f64,
    #[arg(long, default_value = "bottom_center")]
    pub chroma3_position: String,
    #[arg(long, default_value = "green")]
    pub chroma3_key: String,

    /// Chroma-key video for slot 4
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub chroma4: Option<PathBuf>,
    #[arg(long, default_value_t = 0.0)]
    pub chroma4_start: f64,
    #[arg(long, default_value = "bottom_center")]
    pub chroma4_position: String,
    #[arg(long, default_value = "green")]
    pub chroma4_key: String,

    /// Chroma-key video for slot 5
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub chroma5: Option<PathBuf>,
    #[arg(long, default_value_t = 0.0)]
    pub chroma5_start: f64,
    #[arg(long, default_value = "bottom_center")]
    pub chroma5_position: String,
    #[arg(long, default_value = "green")]
    pub chroma5_key: String,
}

/// One filled chroma slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ChromaSlot {
    pub slot: usize,
    pub path: PathBuf,
    pub start: f64,
    pub position: String,
    pub key: String,
}

impl ChromaArgs {
    /// Slots that name a file, in slot order.
    pub fn slots(&self) -> Vec<ChromaSlot> {
        [
            (&self.chroma1, self.chroma1_start, &self.chroma1_position, &self.chroma1_key),
            (&self.chroma2, self.chroma2_start, &self.chroma2_position, &self.chroma2_key),
            (&self.chroma3, self.chroma3_start, &self.chroma3_position, &self.chroma3_key),
            (&self.chroma4, self.chroma4_start, &self.chroma4_position, &self.chroma4_key),
            (&self.chroma5, self.chroma5_start, &self.chroma5_position, &self.chroma5_key),
        ]
        .into_iter()
        .enumerate()
        .filter_map(|(i, (path, start, position, key))| {
            path.as_ref().map(|path| ChromaSlot {
                slot: i + 1,
                path: path.clone(),
                start,
                position: position.clone(),
                key: key.clone(),
            })
        })
        .collect()
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct CaptionArgs {
    /// Burn captions into the video
    #[arg(long)]
    pub captions: bool,

    /// Recognizer model directory (must contain am, conf, graph)
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub caption_model: Option<PathBuf>,

    /// Recognizer output (JSON runs) to caption from
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub caption_transcript: Option<PathBuf>,

    /// Existing SRT file to caption from
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "caption_transcript")]
    pub caption_srt: Option<PathBuf>,

    /// Drop recognizer runs below this mean confidence
    #[arg(long)]
    pub caption_confidence: Option<f64>,

    /// Longest caption in seconds
    #[arg(long, value_name = "SECONDS")]
    pub caption_max_duration: Option<f64>,

    /// Named style preset from the config
    #[arg(long)]
    pub caption_preset: Option<String>,

    #[arg(long)]
    pub caption_font_size: Option<u32>,
    #[arg(long)]
    pub caption_font_color: Option<String>,
    /// Box color behind the text; pass an empty string for no box
    #[arg(long)]
    pub caption_bg_color: Option<String>,
    #[arg(long)]
    pub caption_position: Option<String>,
    #[arg(long)]
    pub caption_margin: Option<u32>,
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub caption_font_file: Option<PathBuf>,

    /// Also write the captions as SRT
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub export_srt: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CaptionsArgs {
    /// Recognizer output (JSON runs)
    #[arg(value_hint = ValueHint::FilePath)]
    pub transcript: PathBuf,

    /// SRT destination; printed to stdout when omitted
    #[arg(short = 'o', long, value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Project config supplying thresholds and style limits
    #[arg(short = 'c', long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub confidence: Option<f64>,

    #[arg(long, value_name = "SECONDS")]
    pub max_duration: Option<f64>,

    #[arg(long)]
    pub preset: Option<String>,

    /// Overwrite an existing SRT file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Project config to check
    #[arg(short = 'c', long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Recognizer model directory to check as well
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub model: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    /// Media file to inspect
    #[arg(value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// ffprobe executable
    #[arg(long, value_hint = ValueHint::ExecutablePath)]
    pub ffprobe: Option<PathBuf>,

    /// Seconds before the probe is abandoned
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}
