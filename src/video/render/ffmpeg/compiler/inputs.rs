use std::path::Path;

use super::super::graph::{InputKind, InputSpec};

const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "mov", "avi", "mkv", "webm"];

pub fn is_video_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Video overlays loop for the whole render; stills are read once.
pub fn overlay_input(path: &Path) -> InputSpec {
    if is_video_path(path) {
        InputSpec::new(path, InputKind::Looped { duration: None })
    } else {
        InputSpec::media(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_overlays_loop() {
        assert!(is_video_path(Path::new("clip.MOV")));
        assert!(!is_video_path(Path::new("frame.png")));
        assert!(!is_video_path(Path::new("noext")));
        assert_eq!(
            overlay_input(Path::new("rain.webm")).args(),
            vec!["-stream_loop", "-1", "-i", "rain.webm"]
        );
        assert_eq!(overlay_input(Path::new("a.png")).args(), vec!["-i", "a.png"]);
    }
}
