//! Render sequencing
//!
//! A render is planned first and executed second. [`RenderSequencer::plan`]
//! touches nothing but the probe and the segment cache's hash file; it
//! returns every ffmpeg invocation in order. [`RenderSequencer::execute`]
//! walks that plan through the states
//!
//! ```text
//! Idle -> PreRenderSegments -> ConcatenateWithTransitions -> AddAudioAndEffects -> Done
//! ```
//!
//! entering `Failed` on the first error. The straight path (no transition)
//! has a single `AddAudioAndEffects` step reading a concat list of the
//! stills. Work files live in a temp dir owned by the plan and disappear
//! with it.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::TempDir;

use super::ffmpeg::command::{RenderSettings, build_command, stream_copy_command};
use super::ffmpeg::compiler::transitions::{
    TransitionChoice, build_xfade_chain, chained_duration, transition_duration,
};
use super::ffmpeg::compiler::util::format_time;
use super::ffmpeg::compiler::{AudioTrack, FfmpegCompiler, VOLUME};
use super::ffmpeg::graph::{FilterGraph, InputKind, InputSpec};
use super::ffmpeg::services::{FfmpegRunOptions, FfmpegRunner};
use super::logging::{log_event, log_step};
use super::segments::{CacheEntry, MotionEffect, SegmentJob, cache_key, segment_command, unique_images};
use super::timeline::{Clip, EffectDescriptor, Timeline};
use crate::ui::prelude::Level;
use crate::video::support::ffmpeg::MediaProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    PreRenderSegments,
    ConcatenateWithTransitions,
    AddAudioAndEffects,
    Done,
    Failed,
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::PreRenderSegments => "pre-render segments",
            Self::ConcatenateWithTransitions => "concatenate with transitions",
            Self::AddAudioAndEffects => "add audio and effects",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Time budgets per kind of invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub probe: Duration,
    pub segment: Duration,
    pub concat: Duration,
    pub batch_concat: Duration,
    pub render: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(30),
            segment: Duration::from_secs(30),
            concat: Duration::from_secs(120),
            batch_concat: Duration::from_secs(300),
            render: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SequencerOptions {
    pub transition: TransitionChoice,
    pub transition_duration: Option<f64>,
    pub motion: MotionEffect,
    /// Most segments joined by one cross-fade command.
    pub max_inputs_per_batch: usize,
    /// Default level for background tracks without a `volume` effect.
    pub background_volume: f64,
    pub cache_dir: PathBuf,
    pub timeouts: StageTimeouts,
    pub verbose: bool,
    /// Fixed seed for `random` transitions.
    pub seed: Option<u64>,
}

impl Default for SequencerOptions {
    fn default() -> Self {
        Self {
            transition: TransitionChoice::None,
            transition_duration: None,
            motion: MotionEffect::None,
            max_inputs_per_batch: 10,
            background_volume: 0.2,
            cache_dir: std::env::temp_dir().join("reelsmith").join("segments"),
            timeouts: StageTimeouts::default(),
            verbose: false,
            seed: None,
        }
    }
}

/// One ffmpeg invocation of a plan.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub state: SequencerState,
    pub label: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub expected_duration: Option<f64>,
    /// Text files written right before the command runs.
    pub writes: Vec<(PathBuf, String)>,
    /// Cache segment to move into place once the command succeeds.
    pub promotes: Option<usize>,
    /// Replace the `-t` clamp with this file's probed length, when known.
    pub measure: Option<PathBuf>,
}

#[derive(Debug)]
pub struct RenderPlan {
    work_dir: TempDir,
    pub steps: Vec<PlannedStep>,
    pub cache: Option<CacheEntry>,
    pub cache_hit: bool,
    pub output: PathBuf,
    /// Planned output length; narration wins over the computed video length.
    pub duration: f64,
}

impl RenderPlan {
    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    pub fn count(&self, state: SequencerState) -> usize {
        self.steps.iter().filter(|s| s.state == state).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderReport {
    pub output: PathBuf,
    pub steps_run: usize,
    pub segments_rendered: usize,
    pub cache_hit: bool,
    pub duration: f64,
}

pub struct RenderSequencer<'a> {
    runner: &'a dyn FfmpegRunner,
    probe: &'a dyn MediaProbe,
    settings: RenderSettings,
    options: SequencerOptions,
    state: SequencerState,
    history: Vec<SequencerState>,
}

impl<'a> RenderSequencer<'a> {
    pub fn new(
        runner: &'a dyn FfmpegRunner,
        probe: &'a dyn MediaProbe,
        settings: RenderSettings,
        options: SequencerOptions,
    ) -> Self {
        Self {
            runner,
            probe,
            settings,
            options,
            state: SequencerState::Idle,
            history: vec![SequencerState::Idle],
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> &[SequencerState] {
        &self.history
    }

    /// Plan and execute in one go.
    pub fn render(&mut self, timeline: &Timeline, output: &Path) -> Result<RenderReport> {
        let plan = match self.plan(timeline, output) {
            Ok(plan) => plan,
            Err(err) => {
                self.enter(SequencerState::Failed);
                return Err(err);
            }
        };
        self.execute(plan)
    }

    pub fn plan(&self, timeline: &Timeline, output: &Path) -> Result<RenderPlan> {
        timeline.ensure_renderable()?;
        let clips = timeline.video_clips();
        let segment_duration = slideshow_segment_duration(clips)?;
        let slots: Vec<PathBuf> = clips
            .iter()
            .map(|c| absolute(&c.media_path))
            .collect::<Result<_>>()?;

        let work_dir = tempfile::Builder::new()
            .prefix("reelsmith-")
            .tempdir()
            .context("Failed to create render work directory")?;

        let narration = timeline.narration();
        let narration_duration = narration
            .map(|n| self.probe.duration(&n.media_path))
            .filter(|d| *d > 0.0);

        let mut steps = Vec::new();
        let mut cache = None;
        let mut cache_hit = false;

        let (base, video_length, writes, measure) = if self.options.transition.is_none() {
            let (list, listed) = image_concat_list(&slots, segment_duration, narration_duration);
            let list_path = work_dir.path().join("images.txt");
            let base = InputSpec::new(&list_path, InputKind::ConcatList);
            let writes = vec![(list_path, list)];
            (base, listed, writes, None)
        } else {
            let (unique, mapping) = unique_images(&slots);
            let job = SegmentJob {
                duration: segment_duration,
                motion: self.options.motion,
                resolution: timeline.resolution,
                settings: self.settings.clone(),
            };
            let entry = CacheEntry::new(
                &self.options.cache_dir,
                cache_key(&unique, &job)?,
                &self.settings.container,
            );
            cache_hit = entry.is_complete(unique.len());

            if !cache_hit {
                for (i, image) in unique.iter().enumerate() {
                    steps.push(PlannedStep {
                        state: SequencerState::PreRenderSegments,
                        label: format!("segment {}/{}", i + 1, unique.len()),
                        args: segment_command(image, &entry.partial(i), &job),
                        timeout: self.options.timeouts.segment,
                        expected_duration: Some(segment_duration),
                        writes: Vec::new(),
                        promotes: Some(i),
                        measure: None,
                    });
                }
            }

            let segment_files: Vec<PathBuf> = mapping.iter().map(|&i| entry.segment(i)).collect();
            cache = Some(entry);

            let video = work_dir
                .path()
                .join(format!("video.{}", self.settings.container));
            let length = self.plan_transitions(
                &mut steps,
                work_dir.path(),
                &segment_files,
                segment_duration,
                &video,
            )?;
            let measure = narration_duration.is_none().then(|| video.clone());
            (InputSpec::media(&video), length, Vec::new(), measure)
        };

        let duration = narration_duration.unwrap_or(video_length);
        let audio = audio_tracks(timeline, narration, duration, self.options.background_volume);
        let effects: Vec<&EffectDescriptor> = timeline.visual_effects().collect();

        let mut graph = FfmpegCompiler::new(timeline.resolution).compile(base, &audio, &effects)?;
        graph.max_duration = Some(duration);
        steps.push(PlannedStep {
            state: SequencerState::AddAudioAndEffects,
            label: "final render".to_string(),
            args: build_command(&graph, output, &self.settings)?,
            timeout: self.options.timeouts.render,
            expected_duration: Some(duration),
            writes,
            promotes: None,
            measure,
        });

        Ok(RenderPlan {
            work_dir,
            steps,
            cache,
            cache_hit,
            output: output.to_path_buf(),
            duration,
        })
    }

    /// Cross-fade steps into `video`; returns the joined length.
    fn plan_transitions(
        &self,
        steps: &mut Vec<PlannedStep>,
        work_dir: &Path,
        segment_files: &[PathBuf],
        segment_duration: f64,
        video: &Path,
    ) -> Result<f64> {
        let transition = transition_duration(segment_duration, self.options.transition_duration);
        let mut rng = match self.options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let ceiling = self.options.max_inputs_per_batch.max(1);
        let batches: Vec<&[PathBuf]> = segment_files.chunks(ceiling).collect();

        if batches.len() == 1 {
            let names = self.options.transition.names_for(segment_files.len(), &mut rng);
            steps.push(self.xfade_step(
                "concatenate".to_string(),
                self.options.timeouts.concat,
                &work_dir.join("segments.txt"),
                segment_files,
                segment_duration,
                transition,
                &names,
                video,
            )?);
            return Ok(chained_duration(segment_files.len(), segment_duration, transition));
        }

        log_event(
            Level::Info,
            "video.render.batching",
            format!(
                "{} segments exceed the per-command ceiling of {ceiling}; rendering {} batches",
                segment_files.len(),
                batches.len()
            ),
        );

        let mut batch_outputs = Vec::with_capacity(batches.len());
        let mut total = 0.0;
        for (b, batch) in batches.iter().enumerate() {
            let names = self.options.transition.names_for(batch.len(), &mut rng);
            let out = work_dir.join(format!("batch_{b:03}.{}", self.settings.container));
            steps.push(self.xfade_step(
                format!("batch {}/{}", b + 1, batches.len()),
                self.options.timeouts.concat,
                &work_dir.join(format!("batch_{b:03}.txt")),
                batch,
                segment_duration,
                transition,
                &names,
                &out,
            )?);
            total += chained_duration(batch.len(), segment_duration, transition);
            batch_outputs.push(out);
        }

        let list_path = work_dir.join("batches.txt");
        let mut graph = FilterGraph::new();
        graph.add_input(InputSpec::new(&list_path, InputKind::ConcatList));
        steps.push(PlannedStep {
            state: SequencerState::ConcatenateWithTransitions,
            label: "join batches".to_string(),
            args: stream_copy_command(&graph, video, &self.settings)?,
            timeout: self.options.timeouts.batch_concat,
            expected_duration: Some(total),
            writes: vec![(list_path, file_concat_list(&batch_outputs))],
            promotes: None,
            measure: None,
        });
        Ok(total)
    }

    #[allow(clippy::too_many_arguments)]
    fn xfade_step(
        &self,
        label: String,
        timeout: Duration,
        list_path: &Path,
        files: &[PathBuf],
        segment_duration: f64,
        transition: f64,
        names: &[String],
        output: &Path,
    ) -> Result<PlannedStep> {
        let mut graph = FilterGraph::new();
        let index = graph.add_input(InputSpec::new(list_path, InputKind::ConcatList));
        let video = build_xfade_chain(
            &mut graph,
            &format!("{index}:v"),
            files.len(),
            segment_duration,
            transition,
            names,
        )?;
        graph.video_out = Some(video);

        Ok(PlannedStep {
            state: SequencerState::ConcatenateWithTransitions,
            label,
            args: build_command(&graph, output, &self.settings)?,
            timeout,
            expected_duration: Some(chained_duration(files.len(), segment_duration, transition)),
            writes: vec![(list_path.to_path_buf(), file_concat_list(files))],
            promotes: None,
            measure: None,
        })
    }

    /// Run a plan. The work directory is removed whatever the outcome.
    pub fn execute(&mut self, plan: RenderPlan) -> Result<RenderReport> {
        match self.run_steps(&plan) {
            Ok(segments_rendered) => {
                self.enter(SequencerState::Done);
                Ok(RenderReport {
                    output: plan.output.clone(),
                    steps_run: plan.steps.len(),
                    segments_rendered,
                    cache_hit: plan.cache_hit,
                    duration: plan.duration,
                })
            }
            Err(err) => {
                self.enter(SequencerState::Failed);
                log_event(
                    Level::Error,
                    "video.render.failed",
                    format!("Render failed: {err:#}"),
                );
                Err(err)
            }
        }
    }

    fn run_steps(&mut self, plan: &RenderPlan) -> Result<usize> {
        if let Some(entry) = &plan.cache {
            if plan.cache_hit {
                log_event(
                    Level::Info,
                    "video.render.prerender.cached",
                    format!("Reusing pre-rendered segments from {}", entry.dir.display()),
                );
            } else {
                entry.reset()?;
            }
        }

        let total = plan.steps.len();
        let mut rendered = 0;
        let mut pending_commit = false;

        for (i, step) in plan.steps.iter().enumerate() {
            if step.state != self.state {
                if pending_commit && let Some(entry) = &plan.cache {
                    entry.commit()?;
                    pending_commit = false;
                }
                self.enter(step.state);
            }

            for (path, contents) in &step.writes {
                fs::write(path, contents)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }

            let mut args = step.args.clone();
            let mut expected = step.expected_duration;
            if let Some(path) = &step.measure {
                let measured = self.probe.duration(path);
                if measured > 0.0 {
                    clamp_duration(&mut args, measured);
                    expected = Some(measured);
                }
            }

            log_step(&step.label, i + 1, total, step.timeout.as_secs());
            let mut options = FfmpegRunOptions::new(step.label.clone(), step.timeout)
                .verbose(self.options.verbose);
            if let Some(expected) = expected {
                options = options.with_progress(expected);
            }
            self.runner.run(&args, options)?;

            if let Some(index) = step.promotes {
                let Some(entry) = &plan.cache else {
                    bail!("segment {index} rendered without a cache entry");
                };
                entry.promote(index)?;
                rendered += 1;
                pending_commit = true;
            }
        }

        if pending_commit && let Some(entry) = &plan.cache {
            entry.commit()?;
        }
        Ok(rendered)
    }

    fn enter(&mut self, state: SequencerState) {
        if self.state == state {
            return;
        }
        log_event(
            Level::Debug,
            "video.render.state",
            format!("{} -> {}", self.state, state),
        );
        self.state = state;
        self.history.push(state);
    }
}

/// Shared clip length; a slideshow shows every still for the same time.
fn slideshow_segment_duration(clips: &[Clip]) -> Result<f64> {
    let Some(first) = clips.first() else {
        bail!("timeline has no video clips to render");
    };
    let duration = first.duration();
    if let Some(odd) = clips
        .iter()
        .find(|c| (c.duration() - duration).abs() > 1e-6)
    {
        bail!(
            "clip '{}' lasts {}s but slideshow clips must all last {}s",
            odd.id,
            format_time(odd.duration()),
            format_time(duration)
        );
    }
    Ok(duration)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("Failed to resolve {}", path.display()))
}

fn quote_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', r"'\''")
}

/// Concat-demuxer list of already-rendered files.
fn file_concat_list(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|f| format!("file '{}'\n", quote_concat_path(f)))
        .collect()
}

/// List of stills with per-entry durations, stopping once `limit` is
/// covered. The last file is repeated so its duration is honored. Returns
/// the list and the covered length.
fn image_concat_list(slots: &[PathBuf], duration: f64, limit: Option<f64>) -> (String, f64) {
    let mut list = String::new();
    let mut total = 0.0;
    let mut last = None;
    for slot in slots {
        if limit.is_some_and(|limit| total >= limit) {
            break;
        }
        list.push_str(&format!(
            "file '{}'\nduration {}\n",
            quote_concat_path(slot),
            format_time(duration)
        ));
        total += duration;
        last = Some(slot);
    }
    if let Some(last) = last {
        list.push_str(&format!("file '{}'\n", quote_concat_path(last)));
    }
    (list, total)
}

/// Narration first, then background tracks looped over `duration`.
fn audio_tracks(
    timeline: &Timeline,
    narration: Option<&Clip>,
    duration: f64,
    default_volume: f64,
) -> Vec<AudioTrack> {
    let mut tracks = Vec::new();
    if let Some(narration) = narration {
        tracks.push(AudioTrack::narration(narration.media_path.clone()));
    }
    for clip in timeline.background_clips() {
        let volume = clip
            .effects
            .iter()
            .find(|e| e.name == VOLUME)
            .map(|e| e.number_or("level", default_volume))
            .unwrap_or(default_volume)
            .clamp(0.0, 1.0);
        tracks.push(AudioTrack::background(clip.media_path.clone(), volume, duration));
    }
    tracks
}

/// Rewrite the output `-t` value (the last one in the vector).
fn clamp_duration(args: &mut [String], seconds: f64) {
    if let Some(pos) = args.iter().rposition(|a| a == "-t")
        && let Some(value) = args.get_mut(pos + 1)
    {
        *value = format_time(seconds);
    }
}
