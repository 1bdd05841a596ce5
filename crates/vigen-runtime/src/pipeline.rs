//! Generate → judge → decide loop for one image or a directory of images.
//!
//! # Execution Flow
//! 1. Validate the input image (no model call when invalid)
//! 2. Generate an item; a failed or unparseable attempt is retried
//! 3. Run the quality and consistency judges over the same item
//! 4. Apply the decision rule: PASS, REJECT or RETRY
//! 5. On PASS: optional illustration, then persist item and log
//!
//! Every attempt starts from scratch. Nothing from a failed attempt feeds
//! the next prompt, and nothing is persisted unless the item is accepted or
//! held for review.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use vigen_core::{
    decide, ids, list_images, union_codes, validate_image, Category, Decision, Difficulty, GeneratedImage,
    GenerationLog, ImageFormat, Question, ValidationReport,
};

use crate::agents::{visual_spec_for, GenerationOutcome, ImageGenerator, ItemGenerator, VisionClient, RESOLUTION};
use crate::audit;
use crate::config::Settings;
use crate::providers::VisionProvider;
use crate::store::{ArtifactStore, StoreError};
use crate::usage::{LlmUsage, UsageTracker};
use crate::validators::{ConsistencyValidator, Judge, QualityChecker};

/// Errors that stop a batch before any image is processed.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to list images in {path}: {source}")]
    ListImages {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Final status of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    Pass,
    Reject,
    /// Needs a human; only reached with auto-retry disabled
    Review,
    MaxRetriesExceeded,
    InputInvalid,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStatus::Pass => "PASS",
            PipelineStatus::Reject => "REJECT",
            PipelineStatus::Review => "REVIEW",
            PipelineStatus::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            PipelineStatus::InputInvalid => "INPUT_INVALID",
        };
        f.write_str(s)
    }
}

/// Outcome of [`Pipeline::run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub success: bool,
    pub status: PipelineStatus,
    pub item: Option<Question>,
    pub generation_log: Option<GenerationLog>,
    pub quality_report: Option<ValidationReport>,
    pub consistency_report: Option<ValidationReport>,
    pub error_message: Option<String>,

    /// Generation attempts made
    pub attempts: u32,

    /// Model usage of this run only
    pub usage: LlmUsage,
}

impl PipelineResult {
    fn failed(status: PipelineStatus, error_message: String, attempts: u32) -> Self {
        Self {
            success: false,
            status,
            item: None,
            generation_log: None,
            quality_report: None,
            consistency_report: None,
            error_message: Some(error_message),
            attempts,
            usage: LlmUsage::default(),
        }
    }
}

/// Per-run switches.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub difficulty: Difficulty,

    /// Regenerate on RETRY; when off, RETRY becomes REVIEW
    pub auto_retry: bool,

    /// Generation attempts allowed
    pub max_retries: u32,

    /// Persist accepted and review items with their logs
    pub save_results: bool,

    /// Render an illustration for accepted items
    pub generate_image: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::Medium,
            auto_retry: true,
            max_retries: 3,
            save_results: true,
            generate_image: false,
        }
    }
}

impl RunOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_retries: settings.max_regenerations,
            ..Default::default()
        }
    }
}

/// Aggregate numbers over a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub total: usize,
    pub success: usize,
    pub fail: usize,

    /// Percentage of successful runs; 0 for an empty batch
    pub success_rate: f64,

    pub status_distribution: BTreeMap<PipelineStatus, usize>,
}

/// The item pipeline.
pub struct Pipeline {
    generator: ItemGenerator,
    quality: Arc<dyn Judge>,
    consistency: Arc<dyn Judge>,
    illustrator: Option<ImageGenerator>,
    store: ArtifactStore,
    usage: Arc<UsageTracker>,
}

impl Pipeline {
    pub fn new(
        generator: ItemGenerator,
        quality: Arc<dyn Judge>,
        consistency: Arc<dyn Judge>,
        store: ArtifactStore,
        usage: Arc<UsageTracker>,
    ) -> Self {
        Self {
            generator,
            quality,
            consistency,
            illustrator: None,
            store,
            usage,
        }
    }

    pub fn with_illustrator(mut self, illustrator: ImageGenerator) -> Self {
        self.illustrator = Some(illustrator);
        self
    }

    /// Wire every stage to `provider` using `settings`.
    pub fn from_settings(provider: Arc<dyn VisionProvider>, settings: &Settings) -> Self {
        let usage = Arc::new(UsageTracker::new());
        let vision = Arc::new(VisionClient::from_settings(provider.clone(), settings, usage.clone()));
        let image_client = VisionClient::new(provider, settings.image_config())
            .with_transport(settings.transport_policy())
            .with_usage(usage.clone());

        Self::new(
            ItemGenerator::new(vision.clone(), settings.max_vision_actions),
            Arc::new(QualityChecker::new(vision.clone())),
            Arc::new(ConsistencyValidator::new(vision)),
            ArtifactStore::new(&settings.output_dir),
            usage,
        )
        .with_illustrator(ImageGenerator::new(Arc::new(image_client)))
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Usage across every run of this pipeline.
    pub fn usage(&self) -> LlmUsage {
        self.usage.snapshot()
    }

    /// Run the full loop for one image.
    pub async fn run(&self, image_path: &Path, category: Category, options: &RunOptions) -> PipelineResult {
        let before = self.usage.snapshot();
        let mut result = self.run_inner(image_path, category, options).await;
        result.usage = self.usage.snapshot().since(&before);

        tracing::info!(
            image = %image_path.display(),
            status = %result.status,
            attempts = result.attempts,
            llm_calls = result.usage.llm_calls,
            "Pipeline finished"
        );
        result
    }

    async fn run_inner(&self, image_path: &Path, category: Category, options: &RunOptions) -> PipelineResult {
        let check = validate_image(image_path);
        if !check.is_valid() {
            let message = format!("Invalid input image: {}", check.summary());
            audit::error("input", &message);
            return PipelineResult::failed(PipelineStatus::InputInvalid, message, 0);
        }

        let mut last_error = String::from("no attempt was made");
        let mut attempts = 0;

        while attempts < options.max_retries {
            attempts += 1;
            audit::generation_start(attempts, image_path, category);

            let outcome = self.generator.generate(image_path, category, options.difficulty).await;
            audit::generation_complete(outcome.log());

            let (question, log) = match outcome {
                GenerationOutcome::Generated { question, log } => (question, log),
                GenerationOutcome::Unparseable { reason, .. } => {
                    last_error = format!("Could not parse item: {}", reason);
                    if !options.auto_retry {
                        break;
                    }
                    continue;
                }
                GenerationOutcome::Failed { error, .. } => {
                    audit::error("generation", &error);
                    last_error = error;
                    if !options.auto_retry {
                        break;
                    }
                    continue;
                }
            };

            let quality = self.quality.judge(&question).await;
            audit::validation(&quality);
            let consistency = self.consistency.judge(&question).await;
            audit::validation(&consistency);

            match decide(&quality, &consistency) {
                Decision::Pass => {
                    let mut question = question;
                    if options.generate_image {
                        self.illustrate(&mut question).await;
                    }
                    let error_message = if options.save_results {
                        self.persist(&question, &log).await
                    } else {
                        None
                    };
                    audit::info(&format!("Item {} accepted", question.item_id));
                    return PipelineResult {
                        success: true,
                        status: PipelineStatus::Pass,
                        item: Some(question),
                        generation_log: Some(log),
                        quality_report: Some(quality),
                        consistency_report: Some(consistency),
                        error_message,
                        attempts,
                        usage: LlmUsage::default(),
                    };
                }
                Decision::Reject => {
                    let codes = code_list(&quality, &consistency);
                    audit::info(&format!("Item {} rejected: {}", question.item_id, codes));
                    return PipelineResult {
                        success: false,
                        status: PipelineStatus::Reject,
                        item: Some(question),
                        generation_log: Some(log),
                        quality_report: Some(quality),
                        consistency_report: Some(consistency),
                        error_message: Some(format!("Item is below validation criteria: {}", codes)),
                        attempts,
                        usage: LlmUsage::default(),
                    };
                }
                Decision::Retry => {
                    last_error = format!("Validation failed: {}", code_list(&quality, &consistency));
                    if !options.auto_retry {
                        let error_message = if options.save_results {
                            self.persist(&question, &log).await
                        } else {
                            None
                        };
                        return PipelineResult {
                            success: false,
                            status: PipelineStatus::Review,
                            item: Some(question),
                            generation_log: Some(log),
                            quality_report: Some(quality),
                            consistency_report: Some(consistency),
                            error_message: error_message.or_else(|| Some("Manual review required".to_string())),
                            attempts,
                            usage: LlmUsage::default(),
                        };
                    }
                    tracing::info!(attempt = attempts, reason = %last_error, "Regenerating item");
                }
            }
        }

        let message = format!("Maximum retries ({}) exceeded: {}", options.max_retries, last_error);
        audit::error("pipeline", &message);
        PipelineResult::failed(PipelineStatus::MaxRetriesExceeded, message, attempts)
    }

    /// Run every supported image in `dir`, in file name order.
    pub async fn run_batch(
        &self,
        dir: &Path,
        category: Category,
        options: &RunOptions,
    ) -> Result<Vec<PipelineResult>, PipelineError> {
        let images = list_images(dir).map_err(|source| PipelineError::ListImages {
            path: dir.to_path_buf(),
            source,
        })?;
        audit::info(&format!("Batch of {} images from {}", images.len(), dir.display()));

        let mut results = Vec::with_capacity(images.len());
        for (index, image) in images.iter().enumerate() {
            tracing::info!(index = index + 1, total = images.len(), image = %image.display(), "Processing image");
            results.push(self.run(image, category, options).await);
        }
        Ok(results)
    }

    /// Render and save an illustration. Failures are logged and leave the
    /// item untouched.
    async fn illustrate(&self, question: &mut Question) {
        let Some(illustrator) = &self.illustrator else {
            tracing::warn!(item_id = %question.item_id, "Illustration requested but no image model configured");
            return;
        };

        let spec = visual_spec_for(question);
        let rendered = match illustrator.render(&spec).await {
            Ok(r) => r,
            Err(e) => {
                audit::error("illustration", &e);
                return;
            }
        };

        let format = ImageFormat::from_mime(&rendered.mime_type)
            .or_else(|| ImageFormat::sniff(&rendered.data))
            .unwrap_or(ImageFormat::Png);
        let image_id = ids::image_id();
        match self.store.save_image(&image_id, format.extension(), &rendered.data).await {
            Ok(path) => {
                tracing::info!(item_id = %question.item_id, image_id = %image_id, "Illustration saved");
                question.generated_image = Some(GeneratedImage {
                    image_id,
                    path: path.display().to_string(),
                    format: format.name().to_string(),
                    resolution: RESOLUTION.to_string(),
                    visual_spec: Some(spec.clone()),
                    generation_model: rendered.model,
                    generated_at: Utc::now(),
                });
                question.visual_spec = Some(spec);
            }
            Err(e) => audit::error("illustration", &e),
        }
    }

    /// Save item and log; returns an error message on failure.
    async fn persist(&self, question: &Question, log: &GenerationLog) -> Option<String> {
        match self.save_all(question, log).await {
            Ok((item, log)) => {
                tracing::info!(item = %item.display(), log = %log.display(), "Results saved");
                None
            }
            Err(e) => {
                audit::error("persist", &e);
                Some(format!("Failed to save results: {}", e))
            }
        }
    }

    async fn save_all(&self, question: &Question, log: &GenerationLog) -> Result<(PathBuf, PathBuf), StoreError> {
        let item = self.store.save_question(question).await?;
        match self.store.save_log(log).await {
            Ok(log) => Ok((item, log)),
            Err(e) => {
                // An item without its log is not kept
                if let Err(cleanup) = tokio::fs::remove_file(&item).await {
                    tracing::warn!(item = %item.display(), error = %cleanup, "Failed to remove item after log write failed");
                }
                Err(e)
            }
        }
    }
}

/// Summarise a batch.
pub fn statistics(results: &[PipelineResult]) -> BatchStatistics {
    let total = results.len();
    let success = results.iter().filter(|r| r.success).count();
    let mut status_distribution = BTreeMap::new();
    for result in results {
        *status_distribution.entry(result.status).or_insert(0) += 1;
    }

    BatchStatistics {
        total,
        success,
        fail: total - success,
        success_rate: if total == 0 {
            0.0
        } else {
            success as f64 / total as f64 * 100.0
        },
        status_distribution,
    }
}

fn code_list(quality: &ValidationReport, consistency: &ValidationReport) -> String {
    let codes = union_codes(quality, consistency);
    if codes.is_empty() {
        return "review required".to_string();
    }
    codes.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{GenerationConfig, ProviderError, ResponsePart, TransportPolicy};
    use crate::testing::{fail_verdict, item_reply, pass_verdict, png_file, ScriptedProvider};
    use async_trait::async_trait;
    use proptest::prelude::*;
    use vigen_core::{FailureCode, ValidationStatus, ValidatorKind};

    fn pipeline(provider: Arc<ScriptedProvider>, root: &Path) -> Pipeline {
        let usage = Arc::new(UsageTracker::new());
        let vision = Arc::new(
            VisionClient::new(provider.clone(), GenerationConfig::new("gemini-test"))
                .with_transport(TransportPolicy::with_retries(0))
                .with_usage(usage.clone()),
        );
        let image_client = VisionClient::new(
            provider,
            GenerationConfig {
                image_output: true,
                ..GenerationConfig::new("image-test")
            },
        )
        .with_transport(TransportPolicy::with_retries(0))
        .with_usage(usage.clone());

        Pipeline::new(
            ItemGenerator::new(vision.clone(), 5),
            Arc::new(QualityChecker::new(vision.clone())),
            Arc::new(ConsistencyValidator::new(vision)),
            ArtifactStore::new(root),
            usage,
        )
        .with_illustrator(ImageGenerator::new(Arc::new(image_client)))
    }

    fn options(max_retries: u32) -> RunOptions {
        RunOptions {
            max_retries,
            ..Default::default()
        }
    }

    fn count_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_pass_persists_item_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let image = png_file(dir.path(), "rain.png");
        let out = dir.path().join("out");
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_text(&item_reply())
                .with_text(pass_verdict())
                .with_text(pass_verdict()),
        );

        let result = pipeline(provider.clone(), &out)
            .run(&image, Category::Graph, &options(3))
            .await;

        assert!(result.success);
        assert_eq!(result.status, PipelineStatus::Pass);
        assert_eq!(result.attempts, 1);
        assert!(result.error_message.is_none());
        assert_eq!(result.usage.llm_calls, 3);

        let item = result.item.unwrap();
        assert!(out.join("items").join(format!("{}.json", item.item_id)).exists());
        assert_eq!(count_files(&out.join("logs")), 1);
        assert_eq!(provider.remaining(), 0);
    }

    #[tokio::test]
    async fn test_critical_code_rejects_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let image = png_file(dir.path(), "rain.png");
        let out = dir.path().join("out");
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_text(&item_reply())
                .with_text(&fail_verdict("MULTI_CORRECT"))
                .with_text(&fail_verdict("NO_VISUAL_EVIDENCE")),
        );

        let result = pipeline(provider, &out).run(&image, Category::Graph, &options(3)).await;

        assert_eq!(result.status, PipelineStatus::Reject);
        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert!(result.item.is_some());
        let message = result.error_message.unwrap();
        assert!(message.contains("below validation criteria"));
        assert!(message.contains("NO_VISUAL_EVIDENCE"));
        assert!(!out.join("items").exists());
    }

    #[tokio::test]
    async fn test_retry_then_pass() {
        let dir = tempfile::tempdir().unwrap();
        let image = png_file(dir.path(), "rain.png");
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_text(&item_reply())
                .with_text(&fail_verdict("AMBIGUOUS_READ"))
                .with_text(pass_verdict())
                .with_text(&item_reply())
                .with_text(pass_verdict())
                .with_text(pass_verdict()),
        );

        let result = pipeline(provider, &dir.path().join("out"))
            .run(&image, Category::Graph, &options(3))
            .await;
        assert_eq!(result.status, PipelineStatus::Pass);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.usage.llm_calls, 6);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let image = png_file(dir.path(), "rain.png");
        let out = dir.path().join("out");
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_text(&item_reply())
                .with_text(&fail_verdict("MULTI_CORRECT"))
                .with_text(pass_verdict())
                .with_text("I cannot read this chart.")
                .with_text(&item_reply())
                .with_text(pass_verdict())
                .with_text("Looks plausible."),
        );

        let result = pipeline(provider.clone(), &out)
            .run(&image, Category::Graph, &options(3))
            .await;

        assert_eq!(result.status, PipelineStatus::MaxRetriesExceeded);
        assert_eq!(result.attempts, 3);
        assert!(result.item.is_none());
        assert!(result.quality_report.is_none());
        assert!(result.error_message.unwrap().starts_with("Maximum retries (3) exceeded"));
        assert!(!out.exists());
        assert_eq!(provider.remaining(), 0);
    }

    #[tokio::test]
    async fn test_retry_without_auto_retry_is_review() {
        let dir = tempfile::tempdir().unwrap();
        let image = png_file(dir.path(), "rain.png");
        let out = dir.path().join("out");
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_text(&item_reply())
                .with_text(&fail_verdict("OPTION_OVERLAP"))
                .with_text(pass_verdict()),
        );
        let opts = RunOptions {
            auto_retry: false,
            ..options(3)
        };

        let result = pipeline(provider, &out).run(&image, Category::Graph, &opts).await;

        assert_eq!(result.status, PipelineStatus::Review);
        assert_eq!(result.attempts, 1);
        assert_eq!(
            result.quality_report.unwrap().failure_codes,
            vec![FailureCode::OptionOverlap]
        );
        assert_eq!(result.consistency_report.unwrap().status, ValidationStatus::Pass);
        assert_eq!(result.error_message.as_deref(), Some("Manual review required"));
        assert_eq!(count_files(&out.join("items")), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_stops_without_auto_retry() {
        let dir = tempfile::tempdir().unwrap();
        let image = png_file(dir.path(), "rain.png");
        let provider = Arc::new(ScriptedProvider::new().with_error(ProviderError::AuthError));
        let opts = RunOptions {
            auto_retry: false,
            ..options(3)
        };

        let result = pipeline(provider.clone(), &dir.path().join("out"))
            .run(&image, Category::Graph, &opts)
            .await;
        assert_eq!(result.status, PipelineStatus::MaxRetriesExceeded);
        assert_eq!(result.attempts, 1);
        assert!(result.error_message.unwrap().contains("Item generation failed"));
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_makes_no_call() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new());
        let result = pipeline(provider.clone(), dir.path())
            .run(&dir.path().join("missing.png"), Category::Geometry, &options(3))
            .await;

        assert_eq!(result.status, PipelineStatus::InputInvalid);
        assert_eq!(result.attempts, 0);
        assert!(result.error_message.unwrap().contains("Image not found"));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_zero_attempts_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let image = png_file(dir.path(), "rain.png");
        let provider = Arc::new(ScriptedProvider::new());
        let result = pipeline(provider.clone(), dir.path())
            .run(&image, Category::Graph, &options(0))
            .await;
        assert_eq!(result.status, PipelineStatus::MaxRetriesExceeded);
        assert_eq!(result.attempts, 0);
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_illustration_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let image = png_file(dir.path(), "rain.png");
        let out = dir.path().join("out");
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_text(&item_reply())
                .with_text(pass_verdict())
                .with_text(pass_verdict())
                .with_image(&[7, 7, 7]),
        );
        let opts = RunOptions {
            generate_image: true,
            ..options(1)
        };

        let result = pipeline(provider.clone(), &out).run(&image, Category::Graph, &opts).await;
        let item = result.item.unwrap();
        let generated = item.generated_image.unwrap();
        assert!(generated.image_id.starts_with("IMG-"));
        assert_eq!(generated.format, "PNG");
        assert!(generated.path.ends_with(".png"));
        assert_eq!(generated.resolution, "2K");
        assert_eq!(generated.generation_model, "image-test");
        assert_eq!(std::fs::read(&generated.path).unwrap(), vec![7, 7, 7]);
        assert_eq!(item.visual_spec.unwrap().visual_type, "bar_chart");
        assert!(provider.requests()[3].image_output);
    }

    #[tokio::test]
    async fn test_illustration_keeps_returned_format() {
        let dir = tempfile::tempdir().unwrap();
        let image = png_file(dir.path(), "rain.png");
        let out = dir.path().join("out");
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_text(&item_reply())
                .with_text(pass_verdict())
                .with_text(pass_verdict())
                .with_parts(vec![ResponsePart::Image {
                    mime_type: "image/jpeg".to_string(),
                    data: vec![0xFF, 0xD8, 0xFF, 0xE0],
                }]),
        );
        let opts = RunOptions {
            generate_image: true,
            save_results: false,
            ..options(1)
        };

        let result = pipeline(provider, &out).run(&image, Category::Graph, &opts).await;
        let generated = result.item.unwrap().generated_image.unwrap();
        assert_eq!(generated.format, "JPEG");
        assert!(generated.path.ends_with(&format!("{}.jpg", generated.image_id)));
        assert_eq!(std::fs::read(&generated.path).unwrap(), vec![0xFF, 0xD8, 0xFF, 0xE0]);
    }

    #[tokio::test]
    async fn test_illustration_failure_keeps_item() {
        let dir = tempfile::tempdir().unwrap();
        let image = png_file(dir.path(), "rain.png");
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_text(&item_reply())
                .with_text(pass_verdict())
                .with_text(pass_verdict())
                .with_text("No image this time."),
        );
        let opts = RunOptions {
            generate_image: true,
            save_results: false,
            ..options(1)
        };

        let result = pipeline(provider, &dir.path().join("out"))
            .run(&image, Category::Graph, &opts)
            .await;
        assert_eq!(result.status, PipelineStatus::Pass);
        assert!(result.error_message.is_none());
        assert!(result.item.unwrap().generated_image.is_none());
        assert!(!dir.path().join("out").exists());
    }

    fn passing_provider() -> Arc<ScriptedProvider> {
        Arc::new(
            ScriptedProvider::new()
                .with_text(&item_reply())
                .with_text(pass_verdict())
                .with_text(pass_verdict()),
        )
    }

    #[tokio::test]
    async fn test_save_failure_keeps_pass() {
        let dir = tempfile::tempdir().unwrap();
        let image = png_file(dir.path(), "rain.png");
        // The output root is a regular file, so no directory can be created under it
        let out = dir.path().join("out");
        std::fs::write(&out, b"occupied").unwrap();

        let result = pipeline(passing_provider(), &out)
            .run(&image, Category::Graph, &options(3))
            .await;

        assert!(result.success);
        assert_eq!(result.status, PipelineStatus::Pass);
        assert!(result.item.is_some());
        let message = result.error_message.unwrap();
        assert!(message.starts_with("Failed to save results"), "{}", message);
        assert_eq!(std::fs::read(&out).unwrap(), b"occupied");
    }

    #[tokio::test]
    async fn test_log_failure_removes_saved_item() {
        let dir = tempfile::tempdir().unwrap();
        let image = png_file(dir.path(), "rain.png");
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        std::fs::write(out.join("logs"), b"occupied").unwrap();

        let result = pipeline(passing_provider(), &out)
            .run(&image, Category::Graph, &options(3))
            .await;

        assert_eq!(result.status, PipelineStatus::Pass);
        assert!(result
            .error_message
            .unwrap()
            .starts_with("Failed to save results"));
        assert!(out.join("items").is_dir());
        assert_eq!(count_files(&out.join("items")), 0);
    }

    struct FixedJudge {
        kind: ValidatorKind,
        status: ValidationStatus,
        codes: Vec<FailureCode>,
    }

    #[async_trait]
    impl Judge for FixedJudge {
        fn kind(&self) -> ValidatorKind {
            self.kind
        }

        async fn judge(&self, question: &Question) -> ValidationReport {
            let mut report = ValidationReport::new(&question.item_id, self.kind, self.status);
            report.failure_codes = self.codes.clone();
            report
        }
    }

    #[tokio::test]
    async fn test_judges_are_pluggable() {
        let dir = tempfile::tempdir().unwrap();
        let image = png_file(dir.path(), "rain.png");
        let provider = Arc::new(ScriptedProvider::new().with_text(&item_reply()));
        let vision = Arc::new(
            VisionClient::new(provider, GenerationConfig::new("gemini-test"))
                .with_transport(TransportPolicy::with_retries(0)),
        );
        let pipeline = Pipeline::new(
            ItemGenerator::new(vision.clone(), 5),
            Arc::new(FixedJudge {
                kind: ValidatorKind::Quality,
                status: ValidationStatus::Fail,
                codes: vec![FailureCode::OutOfScope],
            }),
            Arc::new(FixedJudge {
                kind: ValidatorKind::Consistency,
                status: ValidationStatus::Pass,
                codes: vec![],
            }),
            ArtifactStore::new(dir.path()),
            vision.usage().clone(),
        );

        let result = pipeline.run(&image, Category::Measurement, &options(3)).await;
        assert_eq!(result.status, PipelineStatus::Reject);
        assert_eq!(result.usage.llm_calls, 1);
    }

    #[tokio::test]
    async fn test_batch_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir(&images).unwrap();
        png_file(&images, "b.png");
        png_file(&images, "a.png");
        std::fs::write(images.join("notes.txt"), "skip me").unwrap();

        let provider = Arc::new(
            ScriptedProvider::new()
                .with_text(&item_reply())
                .with_text(pass_verdict())
                .with_text(pass_verdict())
                .with_text(&item_reply())
                .with_text(pass_verdict())
                .with_text(&fail_verdict("OUT_OF_SCOPE")),
        );
        let opts = RunOptions {
            save_results: false,
            ..options(2)
        };

        let results = pipeline(provider, &dir.path().join("out"))
            .run_batch(&images, Category::Graph, &opts)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].item.as_ref().unwrap().source_image.ends_with("a.png"));
        assert_eq!(results[1].status, PipelineStatus::Reject);

        let stats = statistics(&results);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.success, 1);
        assert_eq!(stats.fail, 1);
        assert!((stats.success_rate - 50.0).abs() < f64::EPSILON);
        assert_eq!(stats.status_distribution.get(&PipelineStatus::Pass), Some(&1));
        assert_eq!(stats.status_distribution.get(&PipelineStatus::Reject), Some(&1));
    }

    #[tokio::test]
    async fn test_batch_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new());
        let err = pipeline(provider, dir.path())
            .run_batch(&dir.path().join("nope"), Category::Graph, &RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ListImages { .. }));
    }

    #[test]
    fn test_empty_batch_statistics() {
        let stats = statistics(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert!(stats.status_distribution.is_empty());
    }

    fn arb_status() -> impl Strategy<Value = PipelineStatus> {
        prop_oneof![
            Just(PipelineStatus::Pass),
            Just(PipelineStatus::Reject),
            Just(PipelineStatus::Review),
            Just(PipelineStatus::MaxRetriesExceeded),
            Just(PipelineStatus::InputInvalid),
        ]
    }

    proptest! {
        #[test]
        fn prop_statistics_add_up(statuses in proptest::collection::vec(arb_status(), 0..20)) {
            let results: Vec<PipelineResult> = statuses
                .iter()
                .map(|s| {
                    let mut r = PipelineResult::failed(*s, String::new(), 1);
                    r.success = *s == PipelineStatus::Pass;
                    r
                })
                .collect();

            let stats = statistics(&results);
            prop_assert_eq!(stats.success + stats.fail, stats.total);
            prop_assert_eq!(stats.status_distribution.values().sum::<usize>(), stats.total);
            prop_assert!((0.0..=100.0).contains(&stats.success_rate));
        }
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&PipelineStatus::MaxRetriesExceeded).unwrap();
        assert_eq!(json, "\"MAX_RETRIES_EXCEEDED\"");
        assert_eq!(PipelineStatus::InputInvalid.to_string(), "INPUT_INVALID");
    }
}
