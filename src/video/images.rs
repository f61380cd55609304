use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::video::render::RenderError;

const MAX_IMAGE_NUMBER: u32 = 99;
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Numbered stills (`1.png`, `2.jpg`, ...) in `dir`, in numeric order.
///
/// The first extension found wins for each number; gaps are skipped.
pub fn discover_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(RenderError::missing("image directory", dir).into());
    }

    let images: Vec<PathBuf> = (1..=MAX_IMAGE_NUMBER)
        .filter_map(|n| {
            IMAGE_EXTENSIONS
                .iter()
                .map(|ext| dir.join(format!("{n}.{ext}")))
                .find(|candidate| candidate.is_file())
        })
        .collect();

    if images.is_empty() {
        return Err(RenderError::missing("numbered images (1.png, 2.jpg, ...) in", dir).into());
    }
    Ok(images)
}

/// Explicit image list; every entry must exist.
pub fn check_images(images: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if images.is_empty() {
        anyhow::bail!("at least one image is required");
    }
    for image in images {
        if !image.is_file() {
            return Err(RenderError::missing("image", image).into());
        }
    }
    Ok(images.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn numbered_images_come_back_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["10.png", "2.jpeg", "1.jpg", "1.png", "notes.txt", "3.gif"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let images = discover_images(dir.path()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["1.png", "2.jpeg", "10.png"]);
    }

    #[test]
    fn empty_or_missing_directories_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_images(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RenderError>(),
            Some(RenderError::MissingResource { .. })
        ));
        assert!(discover_images(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn explicit_images_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("a.png");
        fs::write(&present, b"x").unwrap();
        assert_eq!(check_images(&[present.clone()]).unwrap(), vec![present.clone()]);
        assert!(check_images(&[present, dir.path().join("b.png")]).is_err());
        assert!(check_images(&[]).is_err());
    }
}
