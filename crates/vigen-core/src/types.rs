//! Core types for item generation and validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Item category. Selects the generation prompt and the illustration type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Graph interpretation
    Graph,
    /// Shape and spatial reasoning
    Geometry,
    /// Reading instruments and measured values
    Measurement,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Graph, Category::Geometry, Category::Measurement];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Graph => "graph",
            Category::Geometry => "geometry",
            Category::Measurement => "measurement",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "graph" => Ok(Category::Graph),
            "geometry" => Ok(Category::Geometry),
            "measurement" => Ok(Category::Measurement),
            other => Err(format!("unknown category: {}", other)),
        }
    }
}

/// Item difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {}", other)),
        }
    }
}

/// A labelled answer option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Label (A, B, C, D)
    pub label: String,

    /// Option text
    pub text: String,
}

impl Choice {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// An image region the model inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub region_id: String,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    #[serde(default)]
    pub transform: Option<String>,
    #[serde(default)]
    pub extracted_text: Option<String>,
    #[serde(default)]
    pub extracted_value: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default = "default_purpose")]
    pub purpose: String,
}

fn default_confidence() -> f64 {
    1.0
}

fn default_purpose() -> String {
    "evidence".to_string()
}

/// Visual facts the generation step claims to have read from the image.
///
/// Facts are accumulated in arrival order and never deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidencePack {
    #[serde(default)]
    pub regions: Vec<Region>,

    #[serde(default)]
    pub extracted_facts: Vec<String>,

    #[serde(default)]
    pub analysis_summary: String,
}

/// What to render as an item's illustration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualSpec {
    #[serde(default)]
    pub required: bool,

    /// e.g. `bar_chart`, `geometry`, `diagram`
    #[serde(default)]
    pub visual_type: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub data: serde_json::Value,

    #[serde(default)]
    pub rendering_instructions: String,
}

/// A rendered illustration attached to an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub image_id: String,
    pub path: String,
    pub format: String,
    pub resolution: String,
    #[serde(default)]
    pub visual_spec: Option<VisualSpec>,
    #[serde(default)]
    pub generation_model: String,
    pub generated_at: DateTime<Utc>,
}

/// A generated multiple-choice item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub item_id: String,
    #[serde(rename = "item_type")]
    pub category: Category,
    pub difficulty: Difficulty,
    pub stem: String,
    pub choices: Vec<Choice>,
    pub correct_answer: String,
    pub explanation: String,
    #[serde(default)]
    pub evidence: EvidencePack,
    pub source_image: String,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub model_version: String,
    #[serde(default)]
    pub visual_spec: Option<VisualSpec>,
    #[serde(default)]
    pub generated_image: Option<GeneratedImage>,
}

impl Question {
    /// Labels in choice order.
    pub fn labels(&self) -> Vec<&str> {
        self.choices.iter().map(|c| c.label.as_str()).collect()
    }

    /// The choice designated as correct, if the answer matches a label.
    pub fn correct_choice(&self) -> Option<&Choice> {
        let answer = self.correct_answer.trim();
        self.choices
            .iter()
            .find(|c| c.label.trim().eq_ignore_ascii_case(answer))
    }

    /// Render choices one per line as `  A. text`.
    pub fn choices_block(&self) -> String {
        self.choices
            .iter()
            .map(|c| format!("  {}. {}", c.label, c.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Judge verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pass,
    Fail,
    Review,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationStatus::Pass => write!(f, "pass"),
            ValidationStatus::Fail => write!(f, "fail"),
            ValidationStatus::Review => write!(f, "review"),
        }
    }
}

/// Failure taxonomy shared by all judges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    /// Value cannot be read unambiguously from the image
    AmbiguousRead,
    /// Answer is not supported by anything visible
    NoVisualEvidence,
    /// More than one choice is correct
    MultiCorrect,
    /// Choices overlap or duplicate each other
    OptionOverlap,
    /// Item asks about things outside the image
    OutOfScope,
    /// Item or judge response is malformed
    InvalidFormat,
}

impl FailureCode {
    pub const ALL: [FailureCode; 6] = [
        FailureCode::AmbiguousRead,
        FailureCode::NoVisualEvidence,
        FailureCode::MultiCorrect,
        FailureCode::OptionOverlap,
        FailureCode::OutOfScope,
        FailureCode::InvalidFormat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::AmbiguousRead => "AMBIGUOUS_READ",
            FailureCode::NoVisualEvidence => "NO_VISUAL_EVIDENCE",
            FailureCode::MultiCorrect => "MULTI_CORRECT",
            FailureCode::OptionOverlap => "OPTION_OVERLAP",
            FailureCode::OutOfScope => "OUT_OF_SCOPE",
            FailureCode::InvalidFormat => "INVALID_FORMAT",
        }
    }

    /// Parse a code as written by a judge model. Case and separator tolerant.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|c| c.as_str() == normalized)
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which judge produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    Quality,
    Consistency,
}

/// Output of one judge pass. Never merged across calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub item_id: String,
    pub validator: ValidatorKind,
    pub status: ValidationStatus,
    #[serde(default)]
    pub failure_codes: Vec<FailureCode>,
    #[serde(default)]
    pub details: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub validated_at: DateTime<Utc>,
}

impl ValidationReport {
    pub fn new(item_id: impl Into<String>, validator: ValidatorKind, status: ValidationStatus) -> Self {
        Self {
            item_id: item_id.into(),
            validator,
            status,
            failure_codes: Vec::new(),
            details: Vec::new(),
            recommendations: Vec::new(),
            validated_at: Utc::now(),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ValidationStatus::Pass
    }

    pub fn codes(&self) -> BTreeSet<FailureCode> {
        self.failure_codes.iter().copied().collect()
    }
}

/// Agent execution phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseType {
    Think,
    Act,
    Observe,
}

impl fmt::Display for PhaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseType::Think => write!(f, "think"),
            PhaseType::Act => write!(f, "act"),
            PhaseType::Observe => write!(f, "observe"),
        }
    }
}

/// One audited phase of a vision call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseLog {
    pub phase: PhaseType,
    #[serde(default)]
    pub input_data: serde_json::Value,
    #[serde(default)]
    pub output_data: serde_json::Value,
    #[serde(default)]
    pub code_executed: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl PhaseLog {
    pub fn new(phase: PhaseType, input_data: serde_json::Value, output_data: serde_json::Value) -> Self {
        Self {
            phase,
            input_data,
            output_data,
            code_executed: None,
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn with_code(mut self, code: Option<String>) -> Self {
        self.code_executed = code;
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Audit trail of one generation attempt. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationLog {
    pub session_id: String,
    pub source_image: String,
    #[serde(rename = "item_type")]
    pub category: Category,
    #[serde(default)]
    pub phases: Vec<PhaseLog>,
    #[serde(default)]
    pub total_duration_ms: u64,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub final_item_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl GenerationLog {
    pub fn new(source_image: impl Into<String>, category: Category) -> Self {
        Self {
            session_id: crate::ids::session_id(),
            source_image: source_image.into(),
            category,
            phases: Vec::new(),
            total_duration_ms: 0,
            success: false,
            final_item_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn push_phases(&mut self, phases: impl IntoIterator<Item = PhaseLog>) {
        self.phases.extend(phases);
    }

    pub fn mark_success(&mut self, item_id: impl Into<String>) {
        self.success = true;
        self.final_item_id = Some(item_id.into());
    }
}
