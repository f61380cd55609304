//! Typed filter graph.
//!
//! Stages are recorded as data (input links, a chain of [`Filter`]s, output
//! links) and turned into a `-filter_complex` string in one place. Every
//! stage is checked when it is pushed: consumed labels must exist and be
//! unconsumed, produced labels must be new.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::{Result, bail};
use regex::Regex;

use super::compiler::util::format_time;

static RAW_STREAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+):([va])$").expect("valid stream pattern"));

/// Bracket-wrap a stream reference exactly once.
///
/// `"0:v"`, `"[0:v]"` and `" [0:v] "` all become `"[0:v]"`.
pub fn as_link(label: &str) -> String {
    format!("[{}]", bare(label))
}

/// Strip surrounding whitespace and brackets from a stream reference.
pub fn bare(label: &str) -> &str {
    label.trim().trim_start_matches('[').trim_end_matches(']')
}

/// Input-file stream reference such as `2:a`, as `(index, is_video)`.
pub fn raw_stream(label: &str) -> Option<(usize, bool)> {
    let caps = RAW_STREAM.captures(bare(label))?;
    let index = caps[1].parse().ok()?;
    Some((index, &caps[2] == "v"))
}

/// The `-map` argument for a label: raw refs unbracketed, graph labels bracketed.
pub fn map_arg(label: &str) -> String {
    if raw_stream(label).is_some() {
        bare(label).to_string()
    } else {
        as_link(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputKind {
    /// Single still image looped into a clip of `duration` seconds.
    Image { duration: f64 },
    Media,
    /// Repeated forever, optionally cut at `duration`.
    Looped { duration: Option<f64> },
    /// Concat-demuxer list file.
    ConcatList,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub path: PathBuf,
    pub kind: InputKind,
}

impl InputSpec {
    pub fn new(path: impl Into<PathBuf>, kind: InputKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn media(path: impl Into<PathBuf>) -> Self {
        Self::new(path, InputKind::Media)
    }

    /// Flags placed before `-i` followed by `-i <path>`.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match &self.kind {
            InputKind::Image { duration } => {
                args.extend(["-loop".into(), "1".into(), "-t".into(), format_time(*duration)]);
            }
            InputKind::Media => {}
            InputKind::Looped { duration } => {
                args.extend(["-stream_loop".into(), "-1".into()]);
                if let Some(duration) = duration {
                    args.extend(["-t".into(), format_time(*duration)]);
                }
            }
            InputKind::ConcatList => {
                args.extend(["-f".into(), "concat".into(), "-safe".into(), "0".into()]);
            }
        }
        args.push("-i".into());
        args.push(self.path.to_string_lossy().into_owned());
        args
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawText {
    /// Already escaped for drawtext, unquoted.
    pub text: String,
    pub font_size: u32,
    pub font_color: String,
    pub x: String,
    pub y: String,
    pub border_width: u32,
    pub border_color: String,
    /// `None` or empty disables the box.
    pub box_color: Option<String>,
    /// Already escaped path.
    pub font_file: Option<String>,
    /// Already escaped family name.
    pub font_family: Option<String>,
    pub window: (f64, f64),
}

/// One filter in a stage chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Scale { width: String, height: String },
    /// Fit inside `width`x`height` keeping aspect, then pad centered.
    ScalePad { width: u32, height: u32 },
    Format(&'static str),
    /// `format=rgba,colorchannelmixer=aa=<opacity>`
    Alpha(f64),
    Overlay {
        x: String,
        y: String,
        enable: Option<String>,
    },
    ChromaKey {
        color: String,
        similarity: f64,
        blend: f64,
    },
    SetPts(String),
    /// `trim=start=<s>:end=<e>,setpts=PTS-STARTPTS`
    Trim { start: f64, end: f64 },
    Split(usize),
    Xfade {
        transition: String,
        duration: f64,
        offset: f64,
    },
    Volume(f64),
    Adelay(u64),
    Asplit(usize),
    SidechainCompress {
        threshold: f64,
        ratio: f64,
        attack: f64,
        release: f64,
    },
    /// Always `duration=first`: the first input (narration) sets the length.
    Amix {
        inputs: usize,
        dropout_transition: u32,
        normalize: bool,
    },
    DrawText(DrawText),
    Copy,
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Scale { width, height } => write!(f, "scale={width}:{height}"),
            Filter::ScalePad { width, height } => write!(
                f,
                "scale={width}:{height}:force_original_aspect_ratio=decrease,pad={width}:{height}:(ow-iw)/2:(oh-ih)/2"
            ),
            Filter::Format(pix) => write!(f, "format={pix}"),
            Filter::Alpha(opacity) => {
                write!(f, "format=rgba,colorchannelmixer=aa={}", format_time(*opacity))
            }
            Filter::Overlay { x, y, enable } => {
                write!(f, "overlay=x={x}:y={y}:format=auto")?;
                if let Some(expr) = enable {
                    write!(f, ":enable='{expr}'")?;
                }
                Ok(())
            }
            Filter::ChromaKey {
                color,
                similarity,
                blend,
            } => write!(
                f,
                "chromakey={color}:{}:{}",
                format_time(*similarity),
                format_time(*blend)
            ),
            Filter::SetPts(expr) => write!(f, "setpts={expr}"),
            Filter::Trim { start, end } => write!(
                f,
                "trim=start={}:end={},setpts=PTS-STARTPTS",
                format_time(*start),
                format_time(*end)
            ),
            Filter::Split(n) => write!(f, "split={n}"),
            Filter::Xfade {
                transition,
                duration,
                offset,
            } => write!(
                f,
                "xfade=transition={transition}:duration={}:offset={}",
                format_time(*duration),
                format_time(*offset)
            ),
            Filter::Volume(volume) => write!(f, "volume={}", format_time(*volume)),
            Filter::Adelay(ms) => write!(f, "adelay={ms}|{ms}"),
            Filter::Asplit(n) => write!(f, "asplit={n}"),
            Filter::SidechainCompress {
                threshold,
                ratio,
                attack,
                release,
            } => write!(
                f,
                "sidechaincompress=threshold={}:ratio={}:attack={}:release={}",
                format_time(*threshold),
                format_time(*ratio),
                format_time(*attack),
                format_time(*release)
            ),
            Filter::Amix {
                inputs,
                dropout_transition,
                normalize,
            } => {
                write!(
                    f,
                    "amix=inputs={inputs}:duration=first:dropout_transition={dropout_transition}"
                )?;
                if !normalize {
                    write!(f, ":normalize=0")?;
                }
                Ok(())
            }
            Filter::DrawText(text) => write_drawtext(f, text),
            Filter::Copy => write!(f, "copy"),
        }
    }
}

fn write_drawtext(f: &mut fmt::Formatter<'_>, d: &DrawText) -> fmt::Result {
    write!(f, "drawtext=")?;
    if let Some(file) = &d.font_file {
        write!(f, "fontfile={file}:")?;
    } else if let Some(family) = &d.font_family {
        write!(f, "font={family}:")?;
    }
    write!(
        f,
        "text={}:fontsize={}:fontcolor={}:x={}:y={}:borderw={}:bordercolor={}",
        d.text, d.font_size, d.font_color, d.x, d.y, d.border_width, d.border_color
    )?;
    if let Some(color) = d.box_color.as_deref().filter(|c| !c.trim().is_empty()) {
        write!(f, ":box=1:boxcolor={color}:boxborderw=10")?;
    }
    write!(
        f,
        ":enable='between(t,{},{})'",
        format_time(d.window.0),
        format_time(d.window.1)
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub inputs: Vec<String>,
    pub filters: Vec<Filter>,
    pub outputs: Vec<String>,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for input in &self.inputs {
            write!(f, "{}", as_link(input))?;
        }
        let chain: Vec<String> = self.filters.iter().map(Filter::to_string).collect();
        write!(f, "{}", chain.join(","))?;
        for output in &self.outputs {
            write!(f, "{}", as_link(output))?;
        }
        Ok(())
    }
}

/// Inputs plus stages for one external-tool invocation.
#[derive(Debug, Clone, Default)]
pub struct FilterGraph {
    inputs: Vec<InputSpec>,
    stages: Vec<Stage>,
    produced: HashSet<String>,
    consumed: HashSet<String>,
    next_label: usize,
    /// Final video stream; raw ref or produced label.
    pub video_out: Option<String>,
    pub audio_out: Option<String>,
    /// Output is cut at this many seconds (`-t`).
    pub max_duration: Option<f64>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an input and return its index.
    pub fn add_input(&mut self, input: InputSpec) -> usize {
        self.inputs.push(input);
        self.inputs.len() - 1
    }

    pub fn inputs(&self) -> &[InputSpec] {
        &self.inputs
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// A fresh label `<prefix><n>`, unique within this graph.
    pub fn label(&mut self, prefix: &str) -> String {
        loop {
            self.next_label += 1;
            let candidate = format!("{prefix}{}", self.next_label);
            if !self.produced.contains(&candidate) {
                return candidate;
            }
        }
    }

    /// Record a stage after checking its links.
    pub fn push(&mut self, inputs: &[&str], filters: Vec<Filter>, outputs: &[&str]) -> Result<()> {
        if filters.is_empty() {
            bail!("filter stage has no filters");
        }

        let mut normalized_inputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            let name = bare(input).to_string();
            if let Some((index, _)) = raw_stream(&name) {
                if index >= self.inputs.len() {
                    bail!(
                        "stage references input {index} but only {} inputs exist",
                        self.inputs.len()
                    );
                }
            } else if !self.produced.contains(&name) {
                bail!("stage consumes unknown label [{name}]");
            } else if !self.consumed.insert(name.clone()) {
                bail!("label [{name}] is consumed more than once");
            }
            normalized_inputs.push(name);
        }

        let mut normalized_outputs = Vec::with_capacity(outputs.len());
        for output in outputs {
            let name = bare(output).to_string();
            if raw_stream(&name).is_some() {
                bail!("stage output [{name}] collides with an input stream reference");
            }
            if !self.produced.insert(name.clone()) {
                bail!("label [{name}] is produced more than once");
            }
            normalized_outputs.push(name);
        }

        self.stages.push(Stage {
            inputs: normalized_inputs,
            filters,
            outputs: normalized_outputs,
        });
        Ok(())
    }

    /// Serialized stages from index `from` onward.
    pub fn fragment_since(&self, from: usize) -> String {
        self.stages[from.min(self.stages.len())..]
            .iter()
            .map(Stage::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }

    /// The `-filter_complex` value, or `None` when no stage was added.
    pub fn serialize(&self) -> Option<String> {
        if self.stages.is_empty() {
            None
        } else {
            Some(self.fragment_since(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_inputs(n: usize) -> FilterGraph {
        let mut graph = FilterGraph::new();
        for i in 0..n {
            graph.add_input(InputSpec::media(format!("in{i}.mp4")));
        }
        graph
    }

    #[test]
    fn raw_refs_are_bracketed_once() {
        let mut a = graph_with_inputs(2);
        let mut b = graph_with_inputs(2);
        a.push(&["0:v", "1:v"], vec![Filter::Copy], &["out"]).unwrap();
        b.push(&["[0:v]", "[1:v]"], vec![Filter::Copy], &["[out]"]).unwrap();
        assert_eq!(a.serialize(), b.serialize());
        assert_eq!(a.serialize().unwrap(), "[0:v][1:v]copy[out]");
    }

    #[test]
    fn rejects_unknown_and_reused_labels() {
        let mut graph = graph_with_inputs(1);
        assert!(graph.push(&["nope"], vec![Filter::Copy], &["x"]).is_err());
        assert!(graph.push(&["3:v"], vec![Filter::Copy], &["x"]).is_err());

        graph.push(&["0:v"], vec![Filter::Copy], &["x"]).unwrap();
        assert!(graph.push(&["0:v"], vec![Filter::Copy], &["x"]).is_err());
        graph.push(&["x"], vec![Filter::Copy], &["y"]).unwrap();
        assert!(graph.push(&["x"], vec![Filter::Copy], &["z"]).is_err());
    }

    #[test]
    fn fresh_labels_skip_taken_names() {
        let mut graph = graph_with_inputs(1);
        graph.push(&["0:v"], vec![Filter::Copy], &["v1"]).unwrap();
        assert_eq!(graph.label("v"), "v2");
        assert_eq!(graph.label("a"), "a3");
    }

    #[test]
    fn map_args_only_bracket_graph_labels() {
        assert_eq!(map_arg("[1:a]"), "1:a");
        assert_eq!(map_arg("aout"), "[aout]");
        assert_eq!(raw_stream("12:v"), Some((12, true)));
        assert_eq!(raw_stream("v12"), None);
    }

    #[test]
    fn filter_strings() {
        assert_eq!(
            Filter::Xfade {
                transition: "fade".into(),
                duration: 1.0,
                offset: 2.0
            }
            .to_string(),
            "xfade=transition=fade:duration=1:offset=2"
        );
        assert_eq!(
            Filter::Amix {
                inputs: 2,
                dropout_transition: 2,
                normalize: true
            }
            .to_string(),
            "amix=inputs=2:duration=first:dropout_transition=2"
        );
        assert_eq!(Filter::Alpha(0.5).to_string(), "format=rgba,colorchannelmixer=aa=0.5");
        assert_eq!(Filter::Adelay(1500).to_string(), "adelay=1500|1500");
    }

    #[test]
    fn drawtext_box_only_with_background() {
        let mut text = DrawText {
            text: "hi".into(),
            font_size: 24,
            font_color: "white".into(),
            x: "(w-text_w)/2".into(),
            y: "h-text_h-50".into(),
            border_width: 2,
            border_color: "black".into(),
            box_color: Some(String::new()),
            font_file: None,
            font_family: Some("Sans".into()),
            window: (1.0, 2.5),
        };
        let plain = Filter::DrawText(text.clone()).to_string();
        assert!(!plain.contains("box=1"));
        assert!(plain.starts_with("drawtext=font=Sans:text=hi:fontsize=24"));
        assert!(plain.ends_with(":enable='between(t,1,2.5)'"));

        text.box_color = Some("black@0.5".into());
        assert!(
            Filter::DrawText(text)
                .to_string()
                .contains(":box=1:boxcolor=black@0.5:boxborderw=10")
        );
    }

    #[test]
    fn input_flags_by_kind() {
        assert_eq!(
            InputSpec::new("a.png", InputKind::Image { duration: 3.0 }).args(),
            vec!["-loop", "1", "-t", "3", "-i", "a.png"]
        );
        assert_eq!(
            InputSpec::new("m.mp3", InputKind::Looped { duration: Some(7.5) }).args(),
            vec!["-stream_loop", "-1", "-t", "7.5", "-i", "m.mp3"]
        );
        assert_eq!(
            InputSpec::new("list.txt", InputKind::ConcatList).args(),
            vec!["-f", "concat", "-safe", "0", "-i", "list.txt"]
        );
    }
}
