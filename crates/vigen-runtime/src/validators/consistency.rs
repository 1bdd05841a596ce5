//! Consistency validator: does the item agree with its source image?

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use vigen_core::{failed_verdict, parse_verdict, Question, ValidationReport, ValidatorKind};

use super::Judge;
use crate::agents::VisionClient;
use crate::prompts;

/// Image-grounded judge pass.
pub struct ConsistencyValidator {
    vision: Arc<VisionClient>,
}

impl ConsistencyValidator {
    pub fn new(vision: Arc<VisionClient>) -> Self {
        Self { vision }
    }

    /// Validate against `image_path` instead of the question's source image.
    pub async fn validate_against(&self, question: &Question, image_path: &Path) -> ValidationReport {
        let prompt = prompts::consistency_prompt(question);
        match self.vision.analyze_image(image_path, &prompt, true).await {
            Ok(analysis) => parse_verdict(&question.item_id, ValidatorKind::Consistency, &analysis.text),
            Err(e) => {
                tracing::warn!(item_id = %question.item_id, error = %e, "Consistency judge call failed");
                failed_verdict(&question.item_id, ValidatorKind::Consistency, &e.to_string())
            }
        }
    }

    /// Validate several items one after another.
    pub async fn validate_batch(&self, questions: &[Question]) -> Vec<ValidationReport> {
        let mut reports = Vec::with_capacity(questions.len());
        for question in questions {
            reports.push(self.judge(question).await);
        }
        reports
    }
}

#[async_trait]
impl Judge for ConsistencyValidator {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Consistency
    }

    async fn judge(&self, question: &Question) -> ValidationReport {
        self.validate_against(question, Path::new(&question.source_image)).await
    }
}
