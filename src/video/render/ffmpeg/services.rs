use std::collections::VecDeque;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::video::render::RenderError;
use crate::video::support::process::{spawn_in_group, wait_with_timeout};

const STDERR_TAIL_LINES: usize = 25;

pub trait FfmpegRunner {
    fn run(&self, args: &[String], options: FfmpegRunOptions) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FfmpegRunOptions {
    /// Pipeline stage name used in errors and progress messages.
    pub stage: String,
    pub timeout: Duration,
    /// Enables the progress bar when known.
    pub total_duration: Option<f64>,
    pub verbose: bool,
}

impl FfmpegRunOptions {
    pub fn new(stage: impl Into<String>, timeout: Duration) -> Self {
        Self {
            stage: stage.into(),
            timeout,
            total_duration: None,
            verbose: false,
        }
    }

    pub fn with_progress(mut self, total_duration: f64) -> Self {
        if total_duration > 0.0 {
            self.total_duration = Some(total_duration);
        }
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SystemFfmpegRunner {
    program: PathBuf,
}

impl SystemFfmpegRunner {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }
}

impl FfmpegRunner for SystemFfmpegRunner {
    fn run(&self, args: &[String], options: FfmpegRunOptions) -> Result<()> {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        let mut child = spawn_in_group(&mut command, "ffmpeg")?;

        let stderr = child
            .stderr
            .take()
            .context("ffmpeg stderr was not captured")?;

        let pb = options.total_duration.map(|duration| {
            let pb = ProgressBar::new((duration * 1000.0) as u64);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% ({eta}) {msg}",
            ) {
                pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb.set_message(options.stage.clone());
            pb
        });

        let reader_pb = pb.clone();
        let verbose = options.verbose;
        let reader = thread::spawn(move || read_ffmpeg_stderr(stderr, verbose, reader_pb.as_ref()));

        let status = wait_with_timeout(&mut child, options.timeout)?;
        let tail = reader.join().unwrap_or_default();

        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }

        let Some(status) = status else {
            return Err(RenderError::Timeout {
                tool: "ffmpeg".to_string(),
                stage: options.stage,
                seconds: options.timeout.as_secs(),
            }
            .into());
        };

        if !status.success() {
            return Err(RenderError::ToolFailed {
                tool: "ffmpeg".to_string(),
                stage: options.stage,
                code: status.code(),
                stderr: tail.join("\n").trim().to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Consume ffmpeg's stderr, driving the progress bar; returns the last lines.
fn read_ffmpeg_stderr<R: Read>(
    mut stderr: R,
    verbose: bool,
    pb: Option<&ProgressBar>,
) -> Vec<String> {
    let mut buffer = [0u8; 4096];
    let mut accumulated = String::new();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

    loop {
        let bytes_read = match stderr.read(&mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        accumulated.push_str(&String::from_utf8_lossy(&buffer[..bytes_read]));

        while let Some(pos) = accumulated.find(['\r', '\n']) {
            let line: String = accumulated.drain(..=pos).collect();
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }

            if verbose {
                eprintln!("{line}");
            }

            if let Some(pb) = pb
                && let Some(progress) = parse_ffmpeg_progress(line)
            {
                pb.set_position((progress * 1000.0) as u64);
                if let Some(speed) = parse_ffmpeg_speed(line) {
                    pb.set_message(speed);
                }
                continue;
            }

            push_tail(&mut tail, line);
        }
    }

    let rest = accumulated.trim();
    if !rest.is_empty() {
        push_tail(&mut tail, rest);
    }
    tail.into_iter().collect()
}

fn push_tail(tail: &mut VecDeque<String>, line: &str) {
    if tail.len() == STDERR_TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line.to_string());
}

fn parse_ffmpeg_progress(line: &str) -> Option<f64> {
    let time_start = line.find("time=")?;
    let time_str = &line[time_start + 5..];
    let time_val = time_str.split_whitespace().next()?;
    parse_time_to_seconds(time_val)
}

fn parse_time_to_seconds(time_str: &str) -> Option<f64> {
    let mut parts = time_str.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn parse_ffmpeg_speed(line: &str) -> Option<String> {
    let speed_start = line.find("speed=")?;
    let speed_str = line[speed_start + 6..].trim_start();
    let speed_end = speed_str.find('x')?;
    Some(speed_str[..=speed_end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_progress_lines() {
        let line = "frame=  120 fps= 60 q=28.0 size=512kB time=00:01:02.50 bitrate=1.2kbits/s speed=2.01x";
        assert_eq!(parse_ffmpeg_progress(line), Some(62.5));
        assert_eq!(parse_ffmpeg_speed(line).as_deref(), Some("2.01x"));
        assert_eq!(parse_ffmpeg_progress("time=N/A"), None);
    }

    #[test]
    fn keeps_stderr_tail_without_progress_noise() {
        let input = "header\rframe=1 time=00:00:01.00 speed=1x\r[error] bad graph\nlast words";
        let tail = read_ffmpeg_stderr(Cursor::new(input), false, None);
        assert_eq!(tail, vec!["header", "frame=1 time=00:00:01.00 speed=1x", "[error] bad graph", "last words"]);

        let pb = ProgressBar::hidden();
        let tail = read_ffmpeg_stderr(Cursor::new(input), false, Some(&pb));
        assert_eq!(tail, vec!["header", "[error] bad graph", "last words"]);
        assert_eq!(pb.position(), 1000);
    }

    #[test]
    fn unterminated_last_line_respects_tail_size() {
        let mut input: String = (0..STDERR_TAIL_LINES).map(|i| format!("line {i}\n")).collect();
        input.push_str("unterminated");
        let tail = read_ffmpeg_stderr(Cursor::new(input), false, None);
        assert_eq!(tail.len(), STDERR_TAIL_LINES);
        assert_eq!(tail.first().map(String::as_str), Some("line 1"));
        assert_eq!(tail.last().map(String::as_str), Some("unterminated"));
    }

    #[test]
    fn non_zero_exit_carries_stderr() {
        let runner = SystemFfmpegRunner::new(PathBuf::from("sh"));
        let args: Vec<String> = ["-c", "echo 'No such filter: bogus' >&2; exit 3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let err = runner
            .run(&args, FfmpegRunOptions::new("concat", Duration::from_secs(10)))
            .unwrap_err();
        match err.downcast_ref::<RenderError>() {
            Some(RenderError::ToolFailed { code, stderr, stage, .. }) => {
                assert_eq!(*code, Some(3));
                assert_eq!(stage, "concat");
                assert!(stderr.contains("No such filter: bogus"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn overdue_run_is_a_timeout() {
        let runner = SystemFfmpegRunner::new(PathBuf::from("sleep"));
        let err = runner
            .run(
                &["30".to_string()],
                FfmpegRunOptions::new("render", Duration::from_millis(200)),
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RenderError>(),
            Some(RenderError::Timeout { .. })
        ));
    }
}
