use anyhow::Result;

use super::super::graph::{DrawText, Filter, FilterGraph};
use super::Applied;
use super::util::{escape_drawtext, escape_filter_value, escape_font_path};
use crate::video::captions::CaptionStyle;
use crate::video::render::timeline::EffectDescriptor;

/// One `drawtext` per caption segment, chained in a single stage.
pub(super) fn burn_captions(
    graph: &mut FilterGraph,
    video: &str,
    effect: &EffectDescriptor,
) -> Result<Applied> {
    let filters: Vec<Filter> = effect
        .captions
        .iter()
        .flat_map(|track| {
            track
                .segments
                .iter()
                .filter(|s| !s.text.trim().is_empty() && s.end_ms > s.start_ms)
                .map(move |s| {
                    Filter::DrawText(drawtext_for(
                        &track.style,
                        &s.text,
                        s.start_seconds(),
                        s.end_seconds(),
                    ))
                })
        })
        .collect();

    if filters.is_empty() {
        return Ok(Applied {
            video: video.to_string(),
            audio: None,
        });
    }

    let out = graph.label("cap");
    graph.push(&[video], filters, &[&out])?;
    Ok(Applied {
        video: out,
        audio: None,
    })
}

pub(super) fn drawtext_for(style: &CaptionStyle, text: &str, start: f64, end: f64) -> DrawText {
    let (x, y) = style.anchor().caption_xy(style.margin_bottom);
    let font_file = style
        .font_file
        .as_deref()
        .filter(|p| p.exists())
        .map(escape_font_path);
    let font_family = if font_file.is_none() {
        style
            .font_family
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .map(escape_filter_value)
    } else {
        None
    };

    DrawText {
        text: escape_drawtext(text.trim()),
        font_size: style.font_size,
        font_color: style.font_color.clone(),
        x,
        y,
        border_width: style.outline_width,
        border_color: style.outline_color.clone(),
        box_color: Some(style.background_color.clone()),
        font_file,
        font_family,
        window: (start, end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_font_file_falls_back_to_family() {
        let style = CaptionStyle {
            font_file: Some(PathBuf::from("/no/such/font.ttf")),
            font_family: Some("DejaVu Sans".to_string()),
            ..CaptionStyle::default()
        };
        let text = drawtext_for(&style, "hello: world", 1.0, 2.0);
        assert!(text.font_file.is_none());
        assert_eq!(text.font_family.as_deref(), Some("DejaVu Sans"));
        assert_eq!(text.text, "hello\\\\: world");
        assert_eq!(text.y, "h-text_h-50");
    }

    #[test]
    fn apostrophes_and_colons_reach_drawtext_intact() {
        use super::super::util::tokenizer::{drawtext_literal, get_token, parse_options};

        let style = CaptionStyle::default();
        let filter = Filter::DrawText(drawtext_for(&style, "it's 50%: ok", 0.0, 1.0)).to_string();
        let args = filter.strip_prefix("drawtext=").unwrap();
        let (graph_token, rest) = get_token(args, "[],;");
        assert!(rest.is_empty());

        let options = parse_options(&graph_token);
        let keys: Vec<&str> = options.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.iter().all(|k| !k.is_empty()), "stray option in {keys:?}");
        let text = options.iter().find(|(k, _)| k == "text").unwrap();
        assert_eq!(drawtext_literal(&text.1), "it's 50%: ok");
        let enable = options.iter().find(|(k, _)| k == "enable").unwrap();
        assert_eq!(enable.1, "between(t,0,1)");
    }

    #[test]
    fn existing_font_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let font = dir.path().join("font.ttf");
        std::fs::write(&font, b"").unwrap();
        let style = CaptionStyle {
            font_file: Some(font),
            font_family: Some("Ignored".to_string()),
            ..CaptionStyle::default()
        };
        let text = drawtext_for(&style, "x", 0.0, 1.0);
        assert!(text.font_file.is_some());
        assert!(text.font_family.is_none());
    }
}
