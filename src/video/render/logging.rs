use serde_json::json;

use crate::ui::prelude::{Level, emit};

pub(super) fn log_event(level: Level, code: &str, message: impl Into<String>) {
    let message = message.into();
    emit(level, code, &message, None);
}

/// Announce one external-tool invocation of a render.
pub(super) fn log_step(label: &str, index: usize, total: usize, timeout_secs: u64) {
    emit(
        Level::Info,
        "video.render.step",
        &format!("[{index}/{total}] {label}"),
        Some(json!({
            "step": label,
            "index": index,
            "total": total,
            "timeout_secs": timeout_secs,
        })),
    );
}
