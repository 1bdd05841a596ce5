//! Judge passes over a generated item.
//!
//! # Isolation Contract
//! Each judge works alone:
//! - it sees only the question (and, for consistency, its source image)
//! - it never sees the other judge's report
//! - it always returns a report; call failures become FAIL reports

use async_trait::async_trait;

use vigen_core::{Question, ValidationReport, ValidatorKind};

mod consistency;
mod quality;

pub use consistency::ConsistencyValidator;
pub use quality::QualityChecker;

/// A validator producing one fresh report per call.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Which report this judge produces.
    fn kind(&self) -> ValidatorKind;

    /// Judge `question`.
    async fn judge(&self, question: &Question) -> ValidationReport;
}
