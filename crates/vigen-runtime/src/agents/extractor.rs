//! Item and passage bounding boxes from rendered exam pages.
//!
//! Pages arrive as images already rendered from the PDF, one file per page,
//! processed in order. A page that cannot be read or parsed is logged and
//! skipped; the rest of the document still goes through.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use vigen_core::{
    parse_page, validate_image, AgenticLog, AgenticStep, ExtractionResult, PageSize, PhaseLog,
};

use super::vision::VisionClient;
use crate::prompts;
use crate::usage::LlmUsage;

/// Everything an extraction run produced, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRun {
    pub result: ExtractionResult,
    pub logs: Vec<AgenticLog>,
    pub usage: LlmUsage,
}

/// Extracts layout from page images.
pub struct PageExtractor {
    vision: Arc<VisionClient>,
    min_confidence: f64,
    max_vision_actions: u32,
    page_size: PageSize,
}

impl PageExtractor {
    pub fn new(vision: Arc<VisionClient>, min_confidence: f64, max_vision_actions: u32) -> Self {
        Self {
            vision,
            min_confidence,
            max_vision_actions,
            page_size: PageSize {
                width: 0.0,
                height: 0.0,
            },
        }
    }

    /// Page size assumed when the model does not report one.
    pub fn with_page_size(mut self, page_size: PageSize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Extract every page of `source`. Page numbers start at 1 in slice order.
    pub async fn extract_document(&self, source: &str, pages: &[PathBuf]) -> ExtractionRun {
        let before = self.vision.usage().snapshot();
        let mut result = ExtractionResult::new(source, pages.len() as u32, self.vision.model());
        let mut logs = Vec::with_capacity(pages.len());

        for (index, page_path) in pages.iter().enumerate() {
            let page_number = index as u32 + 1;
            let log = self.extract_page(page_path, page_number, &mut result).await;
            logs.push(log);
        }

        tracing::info!(
            source,
            total_pages = result.total_pages,
            processed_pages = result.processed_pages,
            items = result.items.len(),
            passages = result.passages.len(),
            "Extraction finished"
        );

        ExtractionRun {
            result,
            logs,
            usage: self.vision.usage().snapshot().since(&before),
        }
    }

    /// Extract one page into `result`, returning its log.
    pub async fn extract_page(&self, page_path: &Path, page_number: u32, result: &mut ExtractionResult) -> AgenticLog {
        let mut log = AgenticLog {
            page_number,
            steps: Vec::new(),
            total_iterations: 0,
            success: false,
        };

        let check = validate_image(page_path);
        if !check.is_valid() {
            log.steps.push(step("error", check.summary()));
            tracing::warn!(page_number, issues = %check.summary(), "Skipping invalid page image");
            return log;
        }

        let prompt = prompts::layout_prompt(page_number, self.max_vision_actions);
        let analysis = match self.vision.analyze_image(page_path, &prompt, true).await {
            Ok(a) => a,
            Err(e) => {
                log.steps.extend(e.phases().iter().map(phase_step));
                log.total_iterations = 1;
                tracing::warn!(page_number, error = %e, "Page extraction call failed");
                return log;
            }
        };

        log.steps.extend(analysis.phases.iter().map(phase_step));
        log.total_iterations = 1;

        let mut page = match parse_page(&analysis.text, page_number, self.page_size) {
            Ok(p) => p,
            Err(e) => {
                log.steps.push(step("error", e.to_string()));
                tracing::warn!(page_number, error = %e, "Could not parse page layout");
                return log;
            }
        };

        let low_confidence = page.retain_confident(self.min_confidence);
        if page.dropped > 0 || low_confidence > 0 {
            tracing::debug!(
                page_number,
                degenerate = page.dropped,
                low_confidence,
                "Dropped page entries"
            );
        }

        log.steps.push(step(
            "result",
            format!("{} items, {} passages", page.items.len(), page.passages.len()),
        ));
        log.success = true;
        result.push_page(page);
        log
    }
}

fn step(step_type: &str, content: impl Into<String>) -> AgenticStep {
    AgenticStep {
        step_type: step_type.to_string(),
        content: content.into(),
        timestamp: Utc::now(),
    }
}

fn phase_step(phase: &PhaseLog) -> AgenticStep {
    let content = match &phase.code_executed {
        Some(code) => format!("{} | code: {}", phase.output_data, code),
        None => phase.output_data.to_string(),
    };
    AgenticStep {
        step_type: phase.phase.to_string(),
        content,
        timestamp: phase.timestamp,
    }
}
