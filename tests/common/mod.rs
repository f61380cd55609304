use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch project: numbered stills, a narration file and fake tools.
pub struct TestEnvironment {
    temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        Ok(Self { temp_dir })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write `count` placeholder images named `1.png`, `2.png`, ...
    pub fn images(&self, count: usize) -> Result<PathBuf> {
        let dir = self.path().join("images");
        fs::create_dir_all(&dir)?;
        for n in 1..=count {
            fs::write(dir.join(format!("{n}.png")), b"png")?;
        }
        Ok(dir)
    }

    pub fn narration(&self) -> Result<PathBuf> {
        let path = self.path().join("narration.wav");
        fs::write(&path, b"wav")?;
        Ok(path)
    }

    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Shell script that ignores its arguments and prints `stdout`.
    #[cfg(unix)]
    pub fn fake_tool(&self, name: &str, stdout: &str) -> Result<PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let path = self.path().join(name);
        fs::write(&path, format!("#!/bin/sh\ncat <<'JSON'\n{stdout}\nJSON\n"))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }
}
