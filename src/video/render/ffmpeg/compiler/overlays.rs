use std::path::Path;

use anyhow::Result;

use super::super::graph::{Filter, FilterGraph, InputSpec};
use super::audio::duck_under_narration;
use super::inputs::overlay_input;
use super::util::format_time;
use super::{Applied, EffectContext};
use crate::video::render::position::Position;
use crate::video::render::timeline::EffectDescriptor;

const LOGO_SCALE: f64 = 0.15;
const CHROMA_SIMILARITY: f64 = 0.2;
const CHROMA_BLEND: f64 = 0.1;

/// Hex value for a named key color; anything else passes through.
pub fn key_color(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "green" | "verde" => "0x00FF00".to_string(),
        "blue" | "azul" => "0x0000FF".to_string(),
        "red" => "0xFF0000".to_string(),
        "black" => "0x000000".to_string(),
        "white" => "0xFFFFFF".to_string(),
        _ => raw.trim().to_string(),
    }
}

fn opacity_of(effect: &EffectDescriptor) -> f64 {
    effect.number_or("opacity", 1.0).clamp(0.0, 1.0)
}

fn margin_of(effect: &EffectDescriptor) -> u32 {
    effect.number_or("margin", 0.0).max(0.0) as u32
}

fn position_of(effect: &EffectDescriptor, fallback: Position) -> Position {
    effect
        .text("position")
        .map(|raw| Position::resolve_or(raw, fallback))
        .unwrap_or(fallback)
}

fn relative_scale(factor: f64) -> Filter {
    let factor = format_time(factor);
    Filter::Scale {
        width: format!("iw*{factor}"),
        height: format!("ih*{factor}"),
    }
}

/// Run `filters` on the new input's video stream; an empty chain uses the
/// raw stream as-is.
fn prepare_input(
    graph: &mut FilterGraph,
    input: InputSpec,
    prefix: &str,
    filters: Vec<Filter>,
) -> Result<(usize, String)> {
    let index = graph.add_input(input);
    let raw = format!("{index}:v");
    if filters.is_empty() {
        return Ok((index, raw));
    }
    let label = graph.label(prefix);
    graph.push(&[&raw], filters, &[&label])?;
    Ok((index, label))
}

fn overlay_onto(
    graph: &mut FilterGraph,
    video: &str,
    layer: &str,
    (x, y): (String, String),
    enable: Option<String>,
) -> Result<String> {
    let out = graph.label("v");
    graph.push(&[video, layer], vec![Filter::Overlay { x, y, enable }], &[&out])?;
    Ok(out)
}

pub(super) fn apply_logo(
    graph: &mut FilterGraph,
    video: &str,
    path: &Path,
    effect: &EffectDescriptor,
) -> Result<Applied> {
    let scale = effect.number_or("scale", LOGO_SCALE);
    let opacity = opacity_of(effect);

    let mut filters = vec![relative_scale(scale)];
    if opacity < 1.0 {
        filters.push(Filter::Alpha(opacity));
    }
    let (_, layer) = prepare_input(graph, InputSpec::media(path), "logo", filters)?;

    let xy = position_of(effect, Position::TopLeft).overlay_xy(margin_of(effect));
    Ok(Applied {
        video: overlay_onto(graph, video, &layer, xy, None)?,
        audio: None,
    })
}

/// Full-frame layer (frames, textures, looped clips) scaled to the output size.
pub(super) fn apply_overlay(
    graph: &mut FilterGraph,
    video: &str,
    path: &Path,
    effect: &EffectDescriptor,
    ctx: &EffectContext,
) -> Result<Applied> {
    let opacity = opacity_of(effect);
    let mut filters = vec![Filter::Scale {
        width: ctx.resolution.width.to_string(),
        height: ctx.resolution.height.to_string(),
    }];
    if opacity < 1.0 {
        filters.push(Filter::Alpha(opacity));
    }
    let (_, layer) = prepare_input(graph, overlay_input(path), "ov", filters)?;

    let xy = position_of(effect, Position::TopLeft).overlay_xy(margin_of(effect));
    Ok(Applied {
        video: overlay_onto(graph, video, &layer, xy, None)?,
        audio: None,
    })
}

pub(super) fn apply_cover(
    graph: &mut FilterGraph,
    video: &str,
    path: &Path,
    effect: &EffectDescriptor,
) -> Result<Applied> {
    let size = effect.number_or("size", 1.0);
    let opacity = opacity_of(effect);

    let mut filters = Vec::new();
    if (size - 1.0).abs() > f64::EPSILON && size > 0.0 {
        filters.push(relative_scale(size));
    }
    if opacity < 1.0 {
        filters.push(Filter::Alpha(opacity));
    }
    let (_, layer) = prepare_input(graph, InputSpec::media(path), "cover", filters)?;

    let xy = position_of(effect, Position::Center).overlay_xy(margin_of(effect));
    Ok(Applied {
        video: overlay_onto(graph, video, &layer, xy, None)?,
        audio: None,
    })
}

/// Visibility predicate for a chroma clip placed at `start`.
pub(super) fn chroma_enable(start: f64, duration: Option<f64>) -> Option<String> {
    match duration.filter(|d| *d > 0.0) {
        Some(duration) => Some(format!(
            "between(t,{},{})",
            format_time(start),
            format_time(start + duration)
        )),
        None if start > 0.0 => Some(format!("gte(t,{})", format_time(start))),
        None => None,
    }
}

pub(super) fn apply_chroma(
    graph: &mut FilterGraph,
    video: &str,
    audio: Option<&str>,
    path: &Path,
    effect: &EffectDescriptor,
    ctx: &EffectContext,
) -> Result<Applied> {
    let start = effect.number_or("start", 0.0).max(0.0);
    let size = effect.number_or("size", 1.0);
    let opacity = opacity_of(effect);
    let color = key_color(effect.text("key").unwrap_or("green"));

    let mut filters = vec![Filter::SetPts(format!(
        "PTS-STARTPTS+{}/TB",
        format_time(start)
    ))];
    if (size - 1.0).abs() > f64::EPSILON && size > 0.0 {
        filters.push(relative_scale(size));
    }
    filters.push(Filter::ChromaKey {
        color,
        similarity: effect.number_or("similarity", CHROMA_SIMILARITY),
        blend: effect.number_or("blend", CHROMA_BLEND),
    });
    filters.push(if opacity < 1.0 {
        Filter::Alpha(opacity)
    } else {
        Filter::Format("rgba")
    });

    let (index, layer) = prepare_input(graph, InputSpec::media(path), "chroma", filters)?;
    let xy = position_of(effect, Position::BottomCenter).overlay_xy(margin_of(effect));
    let enable = chroma_enable(start, effect.number("duration"));
    let video = overlay_onto(graph, video, &layer, xy, enable)?;

    let with_audio = effect.flag("audio").unwrap_or(false);
    let audio = match audio {
        Some(narration) if with_audio && ctx.has_narration => Some(duck_under_narration(
            graph,
            narration,
            index,
            start,
            &ctx.ducking,
        )?),
        _ => None,
    };

    Ok(Applied { video, audio })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_colors_map_to_hex() {
        assert_eq!(key_color("green"), "0x00FF00");
        assert_eq!(key_color("Blue"), "0x0000FF");
        assert_eq!(key_color("0x123456"), "0x123456");
        assert_eq!(key_color(""), "0x00FF00");
    }

    #[test]
    fn enable_window_depends_on_known_duration() {
        assert_eq!(
            chroma_enable(2.0, Some(3.5)),
            Some("between(t,2,5.5)".to_string())
        );
        assert_eq!(chroma_enable(2.0, None), Some("gte(t,2)".to_string()));
        assert_eq!(chroma_enable(2.0, Some(0.0)), Some("gte(t,2)".to_string()));
        assert_eq!(chroma_enable(0.0, None), None);
    }
}
