//! Multimodal model providers.
//!
//! A provider takes an image plus a prompt and returns the model's response
//! parts. Text, executed code, code output and generated images all come
//! back as [`ResponsePart`]s in the order the model produced them.
//!
//! ## Security
//!
//! API keys go through [`secrets::ApiCredential`] and never appear in
//! `Debug` or `Display` output.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

mod factory;
mod gemini;
pub mod secrets;
mod transport;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use gemini::{GeminiProvider, GeminiProviderFactory, GOOGLE_API_KEY_ENV};
pub use secrets::{ApiCredential, CredentialSource};
pub use transport::{send_with_retry, TransportPolicy};

/// Errors from model providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Response blocked: {0}")]
    Blocked(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Whether the same request may succeed if sent again.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::HttpError(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_) => true,
            ProviderError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Per-call generation settings.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Model to use
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Request timeout
    pub timeout: Duration,

    /// Let the model run code (zoom, crop, measure) before answering
    pub code_execution: bool,

    /// Ask for image output in addition to text
    pub image_output: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-3-flash-preview".to_string(),
            temperature: 0.7,
            timeout: Duration::from_secs(120),
            code_execution: false,
            image_output: false,
        }
    }
}

impl GenerationConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_code_execution(mut self, enabled: bool) -> Self {
        self.code_execution = enabled;
        self
    }
}

/// Raw image bytes with their MIME type.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub mime_type: String,
    pub data: Arc<[u8]>,
}

impl ImageInput {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

/// One request: an optional image followed by a text prompt.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub image: Option<ImageInput>,
    pub prompt: String,
}

impl VisionRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            image: None,
            prompt: prompt.into(),
        }
    }

    pub fn with_image(image: ImageInput, prompt: impl Into<String>) -> Self {
        Self {
            image: Some(image),
            prompt: prompt.into(),
        }
    }
}

/// A piece of model output.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePart {
    Text(String),
    ExecutableCode(String),
    CodeOutput(String),
    Image { mime_type: String, data: Vec<u8> },
}

/// Response from a provider.
#[derive(Debug, Clone, Default)]
pub struct VisionResponse {
    pub parts: Vec<ResponsePart>,
    pub usage: TokenUsage,
    pub model: String,
    pub finish_reason: Option<String>,
}

impl VisionResponse {
    /// All text parts concatenated.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ResponsePart::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The last code block the model executed.
    pub fn code_executed(&self) -> Option<&str> {
        self.parts.iter().rev().find_map(|p| match p {
            ResponsePart::ExecutableCode(c) => Some(c.as_str()),
            _ => None,
        })
    }

    /// Output of the last code execution.
    pub fn code_output(&self) -> Option<&str> {
        self.parts.iter().rev().find_map(|p| match p {
            ResponsePart::CodeOutput(o) => Some(o.as_str()),
            _ => None,
        })
    }

    /// First generated image, if any.
    pub fn first_image(&self) -> Option<(&str, &[u8])> {
        self.parts.iter().find_map(|p| match p {
            ResponsePart::Image { mime_type, data } => Some((mime_type.as_str(), data.as_slice())),
            _ => None,
        })
    }
}

/// Token usage from a single call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// Tokens in the prompt, image included
    pub prompt_tokens: u32,

    /// Tokens in the response
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Provider abstraction over multimodal model backends.
///
/// Every model call in the runtime goes through this trait.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Send one request.
    async fn generate(
        &self,
        request: &VisionRequest,
        config: &GenerationConfig,
    ) -> Result<VisionResponse, ProviderError>;

    /// Check if provider is usable.
    async fn health_check(&self) -> bool;

    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Rough token estimate for a prompt.
    fn estimate_tokens(&self, text: &str) -> u32 {
        (text.len() / 4) as u32
    }
}
