use std::path::PathBuf;

use thiserror::Error;

/// Failure categories surfaced by the render pipeline.
///
/// Most code returns `anyhow::Result`; these variants travel inside the
/// `anyhow::Error` so callers can `downcast_ref::<RenderError>()` when they
/// need to tell a timeout apart from a tool failure.
#[derive(Error, Debug)]
pub enum RenderError {
    /// One or more settings were out of range. Every problem is listed.
    #[error("validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),

    /// A mandatory input (narration, images, model) does not exist.
    #[error("missing {what}: {}", .path.display())]
    MissingResource { what: String, path: PathBuf },

    /// The external tool exited with a non-zero status.
    #[error("{tool} failed during {stage} (exit code {}): {stderr}", exit_code_label(.code))]
    ToolFailed {
        tool: String,
        stage: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The external tool exceeded its time budget and was terminated.
    #[error("{tool} timed out after {seconds}s during {stage}")]
    Timeout {
        tool: String,
        stage: String,
        seconds: u64,
    },
}

fn exit_code_label(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

impl RenderError {
    pub fn missing(what: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::MissingResource {
            what: what.into(),
            path: path.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
