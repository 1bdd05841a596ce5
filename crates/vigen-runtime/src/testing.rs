//! Test doubles shared by the runtime's unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use vigen_core::{Category, Choice, Difficulty, EvidencePack, Question};

use crate::providers::{
    GenerationConfig, ProviderError, ResponsePart, TokenUsage, VisionProvider, VisionRequest, VisionResponse,
};

pub const PNG_HEADER: [u8; 16] = [
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R',
];

/// Write a file with a PNG header.
pub fn png_file(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, PNG_HEADER).unwrap();
    path
}

/// What the provider was asked.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub prompt: String,
    pub mime_type: Option<String>,
    pub model: String,
    pub code_execution: bool,
    pub image_output: bool,
}

/// Provider that replays queued replies in order.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<Vec<ResponsePart>, ProviderError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parts(self, parts: Vec<ResponsePart>) -> Self {
        self.replies.lock().push_back(Ok(parts));
        self
    }

    pub fn with_text(self, text: &str) -> Self {
        self.with_parts(vec![ResponsePart::Text(text.to_string())])
    }

    pub fn with_code_reply(self, text: &str, code: &str, output: &str) -> Self {
        self.with_parts(vec![
            ResponsePart::ExecutableCode(code.to_string()),
            ResponsePart::CodeOutput(output.to_string()),
            ResponsePart::Text(text.to_string()),
        ])
    }

    pub fn with_image(self, data: &[u8]) -> Self {
        self.with_parts(vec![
            ResponsePart::Text("Here is the illustration.".to_string()),
            ResponsePart::Image {
                mime_type: "image/png".to_string(),
                data: data.to_vec(),
            },
        ])
    }

    pub fn with_error(self, error: ProviderError) -> Self {
        self.replies.lock().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().len()
    }
}

#[async_trait]
impl VisionProvider for ScriptedProvider {
    async fn generate(
        &self,
        request: &VisionRequest,
        config: &GenerationConfig,
    ) -> Result<VisionResponse, ProviderError> {
        self.requests.lock().push(RecordedRequest {
            prompt: request.prompt.clone(),
            mime_type: request.image.as_ref().map(|i| i.mime_type.clone()),
            model: config.model.clone(),
            code_execution: config.code_execution,
            image_output: config.image_output,
        });

        let reply = self.replies.lock().pop_front().unwrap_or_else(|| {
            Err(ProviderError::ApiError {
                status: 400,
                message: "no scripted reply left".to_string(),
            })
        });

        reply.map(|parts| VisionResponse {
            parts,
            usage: TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 20,
            },
            model: config.model.clone(),
            finish_reason: Some("STOP".to_string()),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Well-formed item JSON in a fenced block.
pub fn item_reply() -> String {
    r#"Analysis:
- The y-axis shows rainfall in mm
- July has the tallest bar at 42 mm

```json
{
    "stem": "In which month was rainfall highest?",
    "choices": [
        {"label": "A", "text": "April"},
        {"label": "B", "text": "May"},
        {"label": "C", "text": "June"},
        {"label": "D", "text": "July"}
    ],
    "correct_answer": "D",
    "explanation": "The July bar reaches 42 mm, the highest on the chart.",
    "evidence_facts": ["July bar = 42 mm"]
}
```"#
        .to_string()
}

pub fn pass_verdict() -> &'static str {
    r#"```json
{"is_valid": true, "failure_codes": [], "details": [], "recommendations": []}
```"#
}

pub fn fail_verdict(code: &str) -> String {
    format!(
        r#"{{"is_valid": false, "failure_codes": ["{}"], "details": ["problem"], "recommendations": ["fix it"]}}"#,
        code
    )
}

pub fn sample_question(source_image: &str) -> Question {
    Question {
        item_id: "ITEM-TEST0001".to_string(),
        category: Category::Graph,
        difficulty: Difficulty::Medium,
        stem: "In which month was rainfall highest?".to_string(),
        choices: vec![
            Choice::new("A", "April"),
            Choice::new("B", "May"),
            Choice::new("C", "June"),
            Choice::new("D", "July"),
        ],
        correct_answer: "D".to_string(),
        explanation: "July reaches 42 mm.".to_string(),
        evidence: EvidencePack {
            extracted_facts: vec!["July bar = 42 mm".to_string()],
            ..Default::default()
        },
        source_image: source_image.to_string(),
        generated_at: chrono::Utc::now(),
        model_version: "test-model".to_string(),
        visual_spec: None,
        generated_image: None,
    }
}
