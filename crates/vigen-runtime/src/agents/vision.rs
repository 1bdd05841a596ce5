//! Vision client: one image + prompt round trip with a phase log.
//!
//! Every call records three phases:
//! - **think**: what is about to be asked
//! - **act**: the model call itself, with any code the model executed
//! - **observe**: a snapshot of the response
//!
//! A failed call records a single error `act` phase after `think`.

use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use vigen_core::input::MAX_IMAGE_BYTES;
use vigen_core::{extract_evidence, truncate_chars, EvidencePack, ImageFormat, PhaseLog, PhaseType};

use crate::config::Settings;
use crate::providers::{
    send_with_retry, GenerationConfig, ImageInput, ProviderError, TransportPolicy, VisionProvider,
    VisionRequest, VisionResponse,
};
use crate::usage::UsageTracker;

/// Errors from a vision call.
#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Failed to read image {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid image {path}: {reason}")]
    InvalidImage { path: PathBuf, reason: String },

    #[error("Model call failed: {source}")]
    Provider {
        #[source]
        source: ProviderError,
        /// Phases recorded before the failure
        phases: Vec<PhaseLog>,
    },
}

impl VisionError {
    /// Phases recorded before the error. Empty for image errors.
    pub fn phases(&self) -> &[PhaseLog] {
        match self {
            VisionError::Provider { phases, .. } => phases,
            _ => &[],
        }
    }
}

/// Parsed result of one vision call.
#[derive(Debug, Clone)]
pub struct VisionAnalysis {
    /// All text parts concatenated
    pub text: String,
    pub code_executed: Option<String>,
    pub code_output: Option<String>,
    /// Model that answered
    pub model: String,
    pub phases: Vec<PhaseLog>,
    pub total_duration_ms: u64,
}

impl VisionAnalysis {
    /// Evidence pack from the analysis text and code output.
    pub fn evidence(&self) -> EvidencePack {
        extract_evidence(&self.text, self.code_output.as_deref())
    }
}

/// Client for one model with shared usage accounting.
pub struct VisionClient {
    provider: Arc<dyn VisionProvider>,
    config: GenerationConfig,
    transport: TransportPolicy,
    usage: Arc<UsageTracker>,
}

impl VisionClient {
    pub fn new(provider: Arc<dyn VisionProvider>, config: GenerationConfig) -> Self {
        Self {
            provider,
            config,
            transport: TransportPolicy::default(),
            usage: Arc::new(UsageTracker::new()),
        }
    }

    /// Analysis-model client configured from settings.
    pub fn from_settings(provider: Arc<dyn VisionProvider>, settings: &Settings, usage: Arc<UsageTracker>) -> Self {
        Self::new(provider, settings.vision_config())
            .with_transport(settings.transport_policy())
            .with_usage(usage)
    }

    pub fn with_transport(mut self, transport: TransportPolicy) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_usage(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = usage;
        self
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    /// Read an image and detect its MIME type from its header.
    pub async fn load_image(path: &Path) -> Result<ImageInput, VisionError> {
        let data = tokio::fs::read(path).await.map_err(|source| VisionError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let invalid = |reason: String| VisionError::InvalidImage {
            path: path.to_path_buf(),
            reason,
        };

        if data.is_empty() {
            return Err(invalid("file is empty".to_string()));
        }
        if data.len() as u64 > MAX_IMAGE_BYTES {
            return Err(invalid(format!("{} bytes exceeds {} byte limit", data.len(), MAX_IMAGE_BYTES)));
        }
        let format = ImageFormat::sniff(&data)
            .ok_or_else(|| invalid("not a PNG, JPEG, GIF or WebP image".to_string()))?;

        Ok(ImageInput::new(format.mime_type(), data))
    }

    /// Send `image_path` with `prompt`.
    pub async fn analyze_image(
        &self,
        image_path: &Path,
        prompt: &str,
        code_execution: bool,
    ) -> Result<VisionAnalysis, VisionError> {
        let image = Self::load_image(image_path).await?;
        let request = VisionRequest::with_image(image, prompt);
        self.run(request, Some(image_path), code_execution).await
    }

    /// Send a text-only prompt.
    pub async fn ask(&self, prompt: &str) -> Result<VisionAnalysis, VisionError> {
        self.run(VisionRequest::text(prompt), None, false).await
    }

    /// Raw call with transport retries; usage is recorded.
    pub async fn send(
        &self,
        request: &VisionRequest,
        code_execution: bool,
    ) -> Result<VisionResponse, ProviderError> {
        let config = GenerationConfig {
            code_execution,
            ..self.config.clone()
        };
        let response = send_with_retry(self.provider.as_ref(), request, &config, self.transport).await?;
        self.usage.record(&response.usage, &response.model);
        Ok(response)
    }

    async fn run(
        &self,
        request: VisionRequest,
        image_path: Option<&Path>,
        code_execution: bool,
    ) -> Result<VisionAnalysis, VisionError> {
        let start = Instant::now();
        let mut phases = vec![PhaseLog::new(
            PhaseType::Think,
            json!({
                "image_path": image_path.map(|p| p.display().to_string()),
                "prompt": truncate_chars(&request.prompt, 100),
            }),
            json!({"status": "planning"}),
        )];

        tracing::debug!(
            provider = self.provider.name(),
            model = %self.config.model,
            code_execution,
            "Sending vision request"
        );

        let act_start = Instant::now();
        let response = match self.send(&request, code_execution).await {
            Ok(r) => r,
            Err(e) => {
                phases.push(PhaseLog::new(
                    PhaseType::Act,
                    json!({"error": true}),
                    json!({"error_message": e.to_string()}),
                ));
                tracing::warn!(model = %self.config.model, error = %e, "Vision request failed");
                return Err(VisionError::Provider { source: e, phases });
            }
        };
        let act_ms = elapsed_ms(act_start);

        let text = response.text();
        let code_executed = response.code_executed().map(str::to_string);
        let code_output = response.code_output().map(str::to_string);

        phases.push(
            PhaseLog::new(
                PhaseType::Act,
                json!({"model": self.config.model, "code_execution": code_execution}),
                json!({"response_length": text.chars().count()}),
            )
            .with_code(code_executed.clone())
            .with_duration(act_ms),
        );

        let total_ms = elapsed_ms(start);
        phases.push(
            PhaseLog::new(
                PhaseType::Observe,
                json!({"raw_response": truncate_chars(&text, 200)}),
                json!({"parsed": true, "total_duration_ms": total_ms}),
            )
            .with_duration(total_ms.saturating_sub(act_ms)),
        );

        Ok(VisionAnalysis {
            text,
            code_executed,
            code_output,
            model: response.model,
            phases,
            total_duration_ms: total_ms,
        })
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
