//! Named anchors and the placement expressions ffmpeg evaluates for them.
//!
//! Nothing here evaluates numbers: the returned strings are spliced into
//! `overlay` (main_w / overlay_w) or `drawtext` (w / text_w) expressions.

/// Canonical anchor names accepted by overlay and caption effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    TopCenter,
    BottomCenter,
}

impl Position {
    pub const ALL: [Position; 7] = [
        Position::Center,
        Position::TopLeft,
        Position::TopRight,
        Position::BottomLeft,
        Position::BottomRight,
        Position::TopCenter,
        Position::BottomCenter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Position::Center => "center",
            Position::TopLeft => "top_left",
            Position::TopRight => "top_right",
            Position::BottomLeft => "bottom_left",
            Position::BottomRight => "bottom_right",
            Position::TopCenter => "top_center",
            Position::BottomCenter => "bottom_center",
        }
    }

    /// Resolve any accepted spelling to a canonical anchor.
    pub fn parse(raw: &str) -> Option<Self> {
        let key = normalize_position(raw);
        Self::ALL.into_iter().find(|p| p.as_str() == key)
    }

    /// Like [`Position::parse`] but falls back to `fallback` for unknown names.
    pub fn resolve_or(raw: &str, fallback: Position) -> Self {
        Self::parse(raw).unwrap_or(fallback)
    }

    /// Overlay placement inside the main frame, `margin` pixels from the edges.
    pub fn overlay_xy(self, margin: u32) -> (String, String) {
        let left = margin.to_string();
        let right = edge("main_w-overlay_w", margin);
        let h_center = "(main_w-overlay_w)/2".to_string();
        let top = margin.to_string();
        let bottom = edge("main_h-overlay_h", margin);
        let v_center = "(main_h-overlay_h)/2".to_string();

        match self {
            Position::Center => (h_center, v_center),
            Position::TopLeft => (left, top),
            Position::TopRight => (right, top),
            Position::BottomLeft => (left, bottom),
            Position::BottomRight => (right, bottom),
            Position::TopCenter => (h_center, top),
            Position::BottomCenter => (h_center, bottom),
        }
    }

    /// drawtext placement for a caption line, `margin` pixels from the edges.
    pub fn caption_xy(self, margin: u32) -> (String, String) {
        let left = margin.to_string();
        let right = edge("w-text_w", margin);
        let h_center = "(w-text_w)/2".to_string();
        let top = margin.to_string();
        let bottom = edge("h-text_h", margin);
        let v_center = "(h-text_h)/2".to_string();

        match self {
            Position::Center => (h_center, v_center),
            Position::TopLeft => (left, top),
            Position::TopRight => (right, top),
            Position::BottomLeft => (left, bottom),
            Position::BottomRight => (right, bottom),
            Position::TopCenter => (h_center, top),
            Position::BottomCenter => (h_center, bottom),
        }
    }
}

fn edge(expr: &str, margin: u32) -> String {
    if margin == 0 {
        expr.to_string()
    } else {
        format!("{expr}-{margin}")
    }
}

/// Lowercase, unify `-`/space to `_`, and map known aliases.
///
/// Unknown names come back normalized but otherwise untouched so the caller
/// decides the fallback.
pub fn normalize_position(raw: &str) -> String {
    let key = raw.trim().to_lowercase().replace(['-', ' '], "_");
    let canonical = match key.as_str() {
        "" | "centro" | "meio" | "middle" | "c" => "center",
        "top" | "tc" => "top_center",
        "bottom" | "bc" => "bottom_center",
        "tl" => "top_left",
        "tr" => "top_right",
        "bl" => "bottom_left",
        "br" | "inferior_direita" | "direita_baixo" => "bottom_right",
        _ => return key,
    };
    canonical.to_string()
}

/// Overlay coordinates for a raw position name; unknown names use center.
pub fn coordinates_for(raw: &str) -> (String, String) {
    Position::resolve_or(raw, Position::Center).overlay_xy(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_to_same_coordinates() {
        let expected = coordinates_for("bottom_right");
        for alias in ["Bottom-Right", "bottom right", "br", "BR", " inferior-direita "] {
            assert_eq!(coordinates_for(alias), expected, "alias {alias}");
        }
        assert_eq!(
            expected,
            ("main_w-overlay_w".to_string(), "main_h-overlay_h".to_string())
        );
    }

    #[test]
    fn every_canonical_name_round_trips() {
        for pos in Position::ALL {
            assert_eq!(Position::parse(pos.as_str()), Some(pos));
            let upper = pos.as_str().to_uppercase().replace('_', " ");
            assert_eq!(Position::parse(&upper), Some(pos));
        }
    }

    #[test]
    fn unknown_names_pass_through_normalized() {
        assert_eq!(normalize_position("Center-Left"), "center_left");
        assert_eq!(Position::parse("center-left"), None);
        assert_eq!(
            coordinates_for("center-left"),
            coordinates_for("center"),
            "unknown falls back to center"
        );
    }

    #[test]
    fn portuguese_and_short_aliases() {
        assert_eq!(normalize_position("meio"), "center");
        assert_eq!(normalize_position("Centro"), "center");
        assert_eq!(normalize_position("bl"), "bottom_left");
        assert_eq!(normalize_position("top"), "top_center");
    }

    #[test]
    fn overlay_margin_offsets_edges_only() {
        let (x, y) = Position::BottomRight.overlay_xy(20);
        assert_eq!(x, "main_w-overlay_w-20");
        assert_eq!(y, "main_h-overlay_h-20");
        let (x, y) = Position::Center.overlay_xy(20);
        assert_eq!(x, "(main_w-overlay_w)/2");
        assert_eq!(y, "(main_h-overlay_h)/2");
    }

    #[test]
    fn caption_bottom_right_uses_margin() {
        let (x, y) = Position::BottomRight.caption_xy(50);
        assert_eq!(x, "w-text_w-50");
        assert_eq!(y, "h-text_h-50");
        let (x, _) = Position::BottomLeft.caption_xy(50);
        assert_eq!(x, "50");
    }
}
