//! Audit trail events.
//!
//! Everything here is emitted on the `vigen::audit` tracing target so it can
//! be filtered or routed separately, e.g. `RUST_LOG=vigen::audit=info`.

use std::fmt::Display;
use std::path::Path;

use vigen_core::{Category, GenerationLog, ValidationReport};

pub const TARGET: &str = "vigen::audit";

pub fn generation_start(attempt: u32, image: &Path, category: Category) {
    tracing::info!(
        target: TARGET,
        event = "generation_start",
        attempt,
        image = %image.display(),
        category = %category,
        "Generation attempt started"
    );
}

pub fn generation_complete(log: &GenerationLog) {
    tracing::info!(
        target: TARGET,
        event = "generation_complete",
        session_id = %log.session_id,
        success = log.success,
        item_id = log.final_item_id.as_deref().unwrap_or("-"),
        phases = log.phases.len(),
        duration_ms = log.total_duration_ms,
        "Generation finished"
    );
}

pub fn validation(report: &ValidationReport) {
    let codes: Vec<&str> = report.failure_codes.iter().map(|c| c.as_str()).collect();
    tracing::info!(
        target: TARGET,
        event = "validation",
        item_id = %report.item_id,
        validator = ?report.validator,
        status = %report.status,
        failure_codes = ?codes,
        "Validation report"
    );
}

pub fn error(stage: &str, error: &dyn Display) {
    tracing::error!(
        target: TARGET,
        event = "error",
        stage,
        error = %error,
        "Pipeline error"
    );
}

pub fn info(message: &str) {
    tracing::info!(target: TARGET, event = "info", "{}", message);
}
