use anyhow::Result;
use serde_json::json;

use super::captions::validate_model_dir;
use super::cli::ValidateArgs;
use super::config::{ProjectConfig, ValidationReport};
use super::render::RenderError;
use crate::ui::prelude::{Level, emit};

pub fn handle_validate(args: ValidateArgs) -> Result<()> {
    let config = ProjectConfig::load_optional(args.config.as_deref())?;
    let report = validation_report(&config, &args);

    for warning in &report.warnings {
        emit(Level::Warn, "video.validate.warning", warning, None);
    }
    if !report.is_ok() {
        return Err(RenderError::Validation(report.errors).into());
    }

    let source = args
        .config
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in defaults".to_string());
    emit(
        Level::Success,
        "video.validate.ok",
        &format!("No problems found in {source}"),
        Some(json!({ "warnings": report.warnings.len() })),
    );
    Ok(())
}

fn validation_report(config: &ProjectConfig, args: &ValidateArgs) -> ValidationReport {
    let mut report = config.validate();
    if let Some(model) = &args.model {
        let already_checked = config.subtitles.enabled
            && config.subtitles.model_path.as_deref() == Some(model.as_path());
        if !already_checked {
            report.errors.extend(validate_model_dir(model));
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn model_dir_is_checked_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProjectConfig::default();
        config.subtitles.enabled = true;
        config.subtitles.model_path = Some(dir.path().to_path_buf());
        let args = ValidateArgs {
            config: None,
            model: Some(dir.path().to_path_buf()),
        };
        assert_eq!(validation_report(&config, &args).errors.len(), 3);
    }

    #[test]
    fn extra_model_dir_adds_its_problems() {
        let args = ValidateArgs {
            config: None,
            model: Some(PathBuf::from("/no/such/model")),
        };
        let report = validation_report(&ProjectConfig::default(), &args);
        assert_eq!(report.errors.len(), 1);
    }
}
