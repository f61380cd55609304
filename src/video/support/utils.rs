use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// Expand a leading `~` in a user-supplied path.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

/// SHA-256 of a file's bytes, hex encoded.
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open {} for hashing", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read {} for hashing", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Two paths name the same file (after resolving, when both exist).
pub fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn fingerprint_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        fs::write(&path, b"one").unwrap();
        let first = fingerprint_file(&path).unwrap();
        assert_eq!(first, fingerprint_file(&path).unwrap());
        fs::write(&path, b"two").unwrap();
        assert_ne!(first, fingerprint_file(&path).unwrap());
    }

    #[test]
    fn same_file_sees_through_relative_segments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        fs::write(&path, b"").unwrap();
        let dotted = dir.path().join(".").join("out.mp4");
        assert!(same_file(&path, &dotted));
        assert!(!same_file(&path, &dir.path().join("other.mp4")));
    }

    #[test]
    fn expand_path_handles_home() {
        let expanded = expand_path("~/clips");
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }
}
