use std::time::Duration;

use anyhow::Result;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Table};
use serde_json::json;

use super::cli::ProbeArgs;
use super::render::RenderError;
use super::render::ffmpeg::compiler::util::format_time;
use super::support::ffmpeg::{FfprobeProbe, MediaProbe, resolve_tool};
use crate::ui::prelude::{Level, OutputFormat, emit, get_output_format};

/// Print what the renderer would learn about a file, fallbacks included.
pub fn handle_probe(args: ProbeArgs) -> Result<()> {
    if !args.file.exists() {
        return Err(RenderError::missing("media file", &args.file).into());
    }

    let program = resolve_tool(args.ffprobe.as_deref(), "ffprobe");
    let probe = FfprobeProbe::new(program, Duration::from_secs(args.timeout.max(1)));
    let info = probe.probe(&args.file);
    let measured = info.duration > 0.0;

    if get_output_format() == OutputFormat::Json {
        emit(
            Level::Info,
            "video.probe.result",
            &format!("Probed {}", args.file.display()),
            Some(json!({
                "file": args.file.display().to_string(),
                "duration": info.duration,
                "width": info.width,
                "height": info.height,
                "has_audio": info.has_audio,
                "duration_known": measured,
            })),
        );
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Property", "Value"]);
    table.add_row(vec![
        Cell::new("File"),
        Cell::new(args.file.display()),
    ]);
    table.add_row(vec![
        Cell::new("Duration"),
        Cell::new(if measured {
            format!("{}s", format_time(info.duration))
        } else {
            "unknown (0)".to_string()
        }),
    ]);
    table.add_row(vec![
        Cell::new("Resolution"),
        Cell::new(format!("{}x{}", info.width, info.height)),
    ]);
    table.add_row(vec![
        Cell::new("Audio"),
        Cell::new(if info.has_audio { "yes" } else { "no" }),
    ]);
    println!("{table}");

    if !measured {
        emit(
            Level::Warn,
            "video.probe.fallback",
            "ffprobe gave no usable answer; the values above are fallbacks",
            None,
        );
    }
    Ok(())
}
