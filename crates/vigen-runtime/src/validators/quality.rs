//! Quality checker: structural rules, then a text-only judge pass.

use async_trait::async_trait;
use std::sync::Arc;

use vigen_core::{check_structure, failed_verdict, parse_verdict, Question, ValidationReport, ValidatorKind};

use super::Judge;
use crate::agents::VisionClient;
use crate::prompts;

/// Rule-based plus model-based quality review.
pub struct QualityChecker {
    vision: Arc<VisionClient>,
}

impl QualityChecker {
    pub fn new(vision: Arc<VisionClient>) -> Self {
        Self { vision }
    }
}

#[async_trait]
impl Judge for QualityChecker {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Quality
    }

    async fn judge(&self, question: &Question) -> ValidationReport {
        let structure = check_structure(question);
        if !structure.is_clean() {
            tracing::info!(
                item_id = %question.item_id,
                findings = structure.findings.len(),
                "Structural check failed, skipping quality judge"
            );
            return structure.into_report(&question.item_id);
        }

        let mut report = match self.vision.ask(&prompts::quality_prompt(question)).await {
            Ok(analysis) => parse_verdict(&question.item_id, ValidatorKind::Quality, &analysis.text),
            Err(e) => {
                tracing::warn!(item_id = %question.item_id, error = %e, "Quality judge call failed");
                failed_verdict(&question.item_id, ValidatorKind::Quality, &e.to_string())
            }
        };
        report.details.extend(structure.warnings);
        report
    }
}
