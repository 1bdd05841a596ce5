//! Google Gemini provider (`generateContent` REST API).
//!
//! Images are sent inline as base64. With code execution enabled the model
//! may run Python to zoom into or measure the image before answering; the
//! executed code and its output come back as separate response parts.
//! Image-capable models return pictures as `inlineData` parts.
//!
//! The HTTP call needs the `gemini` feature. Request building and response
//! parsing are always compiled.

#![cfg_attr(not(feature = "gemini"), allow(dead_code))]

use super::{
    factory::ProviderFactory,
    secrets::{ApiCredential, CredentialSource},
    GenerationConfig, ProviderError, ResponsePart, TokenUsage, VisionProvider, VisionRequest,
    VisionResponse,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Environment variable holding the API key.
pub const GOOGLE_API_KEY_ENV: &str = "GOOGLE_API_KEY";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[cfg(feature = "gemini")]
type HttpClient = reqwest::Client;

#[cfg(not(feature = "gemini"))]
type HttpClient = ();

#[cfg(feature = "gemini")]
fn http_client() -> HttpClient {
    reqwest::Client::new()
}

#[cfg(not(feature = "gemini"))]
fn http_client() -> HttpClient {}

/// Gemini provider.
pub struct GeminiProvider {
    credential: ApiCredential,
    base_url: String,
    client: HttpClient,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            credential: ApiCredential::new(api_key, CredentialSource::Programmatic, "Google API key"),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: http_client(),
        }
    }

    /// Read `GOOGLE_API_KEY` from the environment.
    pub fn from_env() -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_env(GOOGLE_API_KEY_ENV, "Google API key")?;
        Ok(Self {
            credential,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: http_client(),
        })
    }

    /// `api_key` and `base_url` from config, key falling back to the environment.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let credential =
            ApiCredential::from_config_or_env(config, "api_key", GOOGLE_API_KEY_ENV, "Google API key")?;
        let base_url = config["base_url"]
            .as_str()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            credential,
            base_url,
            client: http_client(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum RequestPart {
    InlineData(InlineData),
    Text(String),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    code_execution: JsonValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<&'static str>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePartRaw>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePartRaw {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    executable_code: Option<ExecutableCode>,
    #[serde(default)]
    code_execution_result: Option<CodeExecutionResult>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct ExecutableCode {
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
struct CodeExecutionResult {
    #[serde(default)]
    output: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    message: String,
}

const BLOCKING_FINISH_REASONS: [&str; 4] = ["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

fn build_request(request: &VisionRequest, config: &GenerationConfig) -> GeminiRequest {
    let mut parts = Vec::with_capacity(2);
    if let Some(image) = &request.image {
        parts.push(RequestPart::InlineData(InlineData {
            mime_type: image.mime_type.clone(),
            data: STANDARD.encode(&image.data),
        }));
    }
    parts.push(RequestPart::Text(request.prompt.clone()));

    let tools = if config.code_execution {
        vec![GeminiTool {
            code_execution: serde_json::json!({}),
        }]
    } else {
        Vec::new()
    };

    GeminiRequest {
        contents: vec![GeminiContent { role: "user", parts }],
        tools,
        generation_config: GeminiGenerationConfig {
            temperature: config.temperature,
            response_modalities: config.image_output.then(|| vec!["TEXT", "IMAGE"]),
        },
    }
}

fn parse_response(body: GeminiResponse, requested_model: &str) -> Result<VisionResponse, ProviderError> {
    let usage = body
        .usage_metadata
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
        })
        .unwrap_or_default();
    let model = body.model_version.unwrap_or_else(|| requested_model.to_string());

    let Some(candidate) = body.candidates.into_iter().next() else {
        if let Some(reason) = body.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ProviderError::Blocked(reason));
        }
        return Ok(VisionResponse {
            parts: Vec::new(),
            usage,
            model,
            finish_reason: None,
        });
    };

    let mut parts = Vec::new();
    for raw in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(text) = raw.text.filter(|t| !t.is_empty()) {
            parts.push(ResponsePart::Text(text));
        } else if let Some(code) = raw.executable_code {
            parts.push(ResponsePart::ExecutableCode(code.code));
        } else if let Some(result) = raw.code_execution_result {
            parts.push(ResponsePart::CodeOutput(result.output));
        } else if let Some(inline) = raw.inline_data {
            let data = STANDARD
                .decode(inline.data.as_bytes())
                .map_err(|e| ProviderError::ParseError(format!("inline image data: {}", e)))?;
            parts.push(ResponsePart::Image {
                mime_type: inline.mime_type,
                data,
            });
        }
    }

    if parts.is_empty() {
        if let Some(reason) = candidate
            .finish_reason
            .as_deref()
            .filter(|r| BLOCKING_FINISH_REASONS.contains(r))
        {
            return Err(ProviderError::Blocked(reason.to_string()));
        }
    }

    Ok(VisionResponse {
        parts,
        usage,
        model,
        finish_reason: candidate.finish_reason,
    })
}

#[async_trait]
impl VisionProvider for GeminiProvider {
    #[cfg(feature = "gemini")]
    async fn generate(
        &self,
        request: &VisionRequest,
        config: &GenerationConfig,
    ) -> Result<VisionResponse, ProviderError> {
        let body = build_request(request, config);

        let response = self
            .client
            .post(self.endpoint(&config.model))
            .header("x-goog-api-key", self.credential.expose())
            .header("content-type", "application/json")
            .timeout(config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(config.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(std::time::Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthError);
        }

        if !status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| ProviderError::HttpError(e.to_string()))?;
            let message = serde_json::from_str::<GeminiErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or(text);
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        parse_response(body, &config.model)
    }

    #[cfg(not(feature = "gemini"))]
    async fn generate(
        &self,
        _request: &VisionRequest,
        _config: &GenerationConfig,
    ) -> Result<VisionResponse, ProviderError> {
        Err(ProviderError::NotConfigured(
            "Gemini provider requires 'gemini' feature".to_string(),
        ))
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Factory for Gemini providers.
///
/// ```json
/// {
///   "api_key": "...",          // optional, falls back to GOOGLE_API_KEY
///   "base_url": "https://..."  // optional
/// }
/// ```
pub struct GeminiProviderFactory;

impl ProviderFactory for GeminiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "gemini"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn VisionProvider>, ProviderError> {
        Ok(Arc::new(GeminiProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, "api_key", GOOGLE_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "Google API key required: set 'api_key' in config or {} env",
                GOOGLE_API_KEY_ENV
            )));
        }

        if let Some(url) = config["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({
            "base_url": DEFAULT_BASE_URL,
        })
    }

    fn description(&self) -> &'static str {
        "Google Gemini multimodal provider with code execution and image output"
    }
}
