//! Illustration rendering for accepted items.

use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use vigen_core::{Category, Question, VisualSpec};

use super::vision::VisionClient;
use crate::prompts;
use crate::providers::{ProviderError, VisionRequest};

/// Resolution requested for illustrations.
pub const RESOLUTION: &str = "2K";

/// Errors from illustration rendering.
#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("Image model call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Image model returned no image")]
    NoImage,
}

/// Rendered illustration bytes.
#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub mime_type: String,
    pub data: Vec<u8>,
    pub model: String,
}

/// Visual type used for a category's illustration.
pub fn visual_type(category: Category) -> &'static str {
    match category {
        Category::Graph => "bar_chart",
        Category::Geometry => "geometry",
        Category::Measurement => "diagram",
    }
}

/// Illustration spec for an item.
pub fn visual_spec_for(question: &Question) -> VisualSpec {
    let stem_head: String = question.stem.chars().take(50).collect();
    VisualSpec {
        required: true,
        visual_type: visual_type(question.category).to_string(),
        description: format!("Illustration for item '{}...'", stem_head),
        data: json!({
            "item_type": question.category.as_str(),
            "stem": question.stem,
            "choices": question.choices,
            "correct_answer": question.correct_answer,
        }),
        rendering_instructions: format!(
            "- Clean style suitable for a textbook or exam paper\n\
             - White background\n\
             - Every label and all text clearly legible\n\
             - Render text and math symbols accurately\n\
             - Item type: {}",
            question.category
        ),
    }
}

/// Client for the image-capable model.
pub struct ImageGenerator {
    client: Arc<VisionClient>,
}

impl ImageGenerator {
    /// `client` must be configured for an image-output model.
    pub fn new(client: Arc<VisionClient>) -> Self {
        Self { client }
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    pub async fn render(&self, spec: &VisualSpec) -> Result<RenderedImage, ImagingError> {
        let request = VisionRequest::text(format!(
            "{}\n\nResolution: {}",
            prompts::illustration_prompt(spec),
            RESOLUTION
        ));
        let response = self.client.send(&request, false).await?;
        let (mime_type, data) = response.first_image().ok_or(ImagingError::NoImage)?;

        Ok(RenderedImage {
            mime_type: mime_type.to_string(),
            data: data.to_vec(),
            model: response.model.clone(),
        })
    }
}
