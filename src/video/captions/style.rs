use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::video::render::position::{Position, normalize_position};

/// Caption anchors accepted in styles.
pub const CAPTION_POSITIONS: [&str; 7] = [
    "bottom_center",
    "top_center",
    "center",
    "bottom_left",
    "bottom_right",
    "top_left",
    "top_right",
];

/// Look of burned-in captions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionStyle {
    pub font_size: u32,
    pub font_color: String,
    /// Box color behind the text; empty disables the box.
    pub background_color: String,
    pub position: String,
    pub margin_bottom: u32,
    pub max_chars_per_line: usize,
    pub max_words_per_line: usize,
    pub outline_width: u32,
    pub outline_color: String,
    /// Takes precedence over `font_family` when the file exists.
    pub font_file: Option<PathBuf>,
    pub font_family: Option<String>,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_size: 24,
            font_color: "white".to_string(),
            background_color: "black@0.5".to_string(),
            position: "bottom_center".to_string(),
            margin_bottom: 50,
            max_chars_per_line: 60,
            max_words_per_line: 4,
            outline_width: 2,
            outline_color: "black".to_string(),
            font_file: None,
            font_family: None,
        }
    }
}

impl CaptionStyle {
    pub fn anchor(&self) -> Position {
        Position::resolve_or(&self.position, Position::BottomCenter)
    }

    /// Collect every out-of-range field, each message prefixed with `path`.
    pub fn validate(&self, path: &str) -> Vec<String> {
        let mut errors = Vec::new();

        if !(8..=100).contains(&self.font_size) {
            errors.push(format!(
                "{path}.font_size must be between 8 and 100, found {}",
                self.font_size
            ));
        }

        let position = normalize_position(&self.position);
        if !CAPTION_POSITIONS.contains(&position.as_str()) {
            errors.push(format!(
                "{path}.position must be one of {:?}, found '{}'",
                CAPTION_POSITIONS, self.position
            ));
        }

        if self.margin_bottom > 200 {
            errors.push(format!(
                "{path}.margin_bottom must be between 0 and 200, found {}",
                self.margin_bottom
            ));
        }

        if !(10..=100).contains(&self.max_chars_per_line) {
            errors.push(format!(
                "{path}.max_chars_per_line must be between 10 and 100, found {}",
                self.max_chars_per_line
            ));
        }

        if self.max_words_per_line == 0 {
            errors.push(format!("{path}.max_words_per_line must be at least 1"));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_style_is_valid() {
        assert!(CaptionStyle::default().validate("style").is_empty());
    }

    #[test]
    fn reports_every_problem_at_once() {
        let style = CaptionStyle {
            font_size: 4,
            position: "sideways".to_string(),
            margin_bottom: 500,
            max_chars_per_line: 5,
            ..CaptionStyle::default()
        };
        let errors = style.validate("presets.loud");
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors[0].starts_with("presets.loud.font_size"));
        assert!(errors.iter().any(|e| e.contains("position")));
    }

    #[test]
    fn position_aliases_are_accepted() {
        let style = CaptionStyle {
            position: "Bottom Right".to_string(),
            ..CaptionStyle::default()
        };
        assert!(style.validate("style").is_empty());
        assert_eq!(style.anchor(), Position::BottomRight);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let style: CaptionStyle = serde_json::from_str(r#"{"font_size": 40}"#).unwrap();
        assert_eq!(style.font_size, 40);
        assert_eq!(style.font_color, "white");
        assert_eq!(style.margin_bottom, 50);
    }
}
