use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::video::support::utils::same_file;

/// Refuse to clobber inputs or, without `force`, an existing output; then
/// make sure the parent directory exists.
pub(super) fn prepare_output_destination(
    output_path: &Path,
    inputs: &[PathBuf],
    force: bool,
) -> Result<()> {
    if let Some(input) = inputs.iter().find(|input| same_file(output_path, input)) {
        bail!(
            "Output path {} would overwrite the input {}",
            output_path.display(),
            input.display()
        );
    }

    if output_path.exists() {
        if force {
            fs::remove_file(output_path).with_context(|| {
                format!(
                    "Failed to remove existing output file {} before overwrite",
                    output_path.display()
                )
            })?;
        } else {
            bail!(
                "Output file {} already exists. Use --force to overwrite.",
                output_path.display()
            );
        }
    }

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }

    Ok(())
}
