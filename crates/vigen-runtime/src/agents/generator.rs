//! Item generation from an image.

use std::path::Path;
use std::sync::Arc;

use vigen_core::{parse_item, Category, Difficulty, GenerationLog, Question, QuestionContext};

use super::vision::VisionClient;
use crate::prompts;

/// Result of one generation attempt.
///
/// Every variant carries the attempt's log.
#[derive(Debug)]
pub enum GenerationOutcome {
    /// The response contained a well-formed item
    Generated { question: Question, log: GenerationLog },
    /// The model answered but no item could be parsed
    Unparseable { reason: String, log: GenerationLog },
    /// The image or the model call failed
    Failed { error: String, log: GenerationLog },
}

impl GenerationOutcome {
    pub fn log(&self) -> &GenerationLog {
        match self {
            GenerationOutcome::Generated { log, .. }
            | GenerationOutcome::Unparseable { log, .. }
            | GenerationOutcome::Failed { log, .. } => log,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, GenerationOutcome::Generated { .. })
    }
}

/// Generates one multiple-choice item per call.
pub struct ItemGenerator {
    vision: Arc<VisionClient>,
    max_vision_actions: u32,
}

impl ItemGenerator {
    pub fn new(vision: Arc<VisionClient>, max_vision_actions: u32) -> Self {
        Self {
            vision,
            max_vision_actions,
        }
    }

    pub async fn generate(&self, image_path: &Path, category: Category, difficulty: Difficulty) -> GenerationOutcome {
        self.generate_with_prompt(image_path, category, difficulty, None).await
    }

    /// Generate with `custom_prompt` replacing the category template.
    pub async fn generate_with_prompt(
        &self,
        image_path: &Path,
        category: Category,
        difficulty: Difficulty,
        custom_prompt: Option<&str>,
    ) -> GenerationOutcome {
        let mut log = GenerationLog::new(image_path.display().to_string(), category);
        let prompt = prompts::generation_prompt(category, difficulty, self.max_vision_actions, custom_prompt);

        let analysis = match self.vision.analyze_image(image_path, &prompt, true).await {
            Ok(a) => a,
            Err(e) => {
                log.push_phases(e.phases().iter().cloned());
                tracing::warn!(session_id = %log.session_id, error = %e, "Item generation failed");
                return GenerationOutcome::Failed {
                    error: format!("Item generation failed: {}", e),
                    log,
                };
            }
        };

        log.push_phases(analysis.phases.iter().cloned());
        log.total_duration_ms = analysis.total_duration_ms;

        let draft = match parse_item(&analysis.text) {
            Ok(d) => d,
            Err(e) => {
                tracing::info!(session_id = %log.session_id, reason = %e, "Response did not contain an item");
                return GenerationOutcome::Unparseable {
                    reason: e.to_string(),
                    log,
                };
            }
        };

        let context = QuestionContext {
            category,
            difficulty,
            source_image: image_path.display().to_string(),
            model_version: analysis.model.clone(),
        };
        let question = draft.into_question(context, analysis.evidence());
        log.mark_success(&question.item_id);

        tracing::info!(
            session_id = %log.session_id,
            item_id = %question.item_id,
            choices = question.choices.len(),
            "Item generated"
        );

        GenerationOutcome::Generated { question, log }
    }
}
