//! Item parsing from generation responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

use super::schema::validate_item_schema;
use crate::extract::extract_json_object;
use crate::types::{Category, Choice, Difficulty, EvidencePack, Question};

/// Reasons a generation response does not yield an item.
///
/// Every variant is a retryable generation failure for the pipeline.
#[derive(Error, Debug)]
pub enum ItemParseError {
    #[error("No JSON object found in response")]
    NoJson,

    #[error("Item has {0} choices, at least 2 required")]
    TooFewChoices(usize),

    #[error("Item does not match schema: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Failed to deserialize item: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Duplicate choice label: {0}")]
    DuplicateLabel(String),
}

/// The item as the model wrote it, before ids and provenance are attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDraft {
    #[serde(default)]
    pub stem: String,

    pub choices: Vec<Choice>,

    #[serde(default)]
    pub correct_answer: String,

    #[serde(default)]
    pub explanation: String,

    #[serde(default)]
    pub evidence_facts: Vec<String>,
}

/// Provenance attached to a draft when it becomes a [`Question`].
#[derive(Debug, Clone)]
pub struct QuestionContext {
    pub category: Category,
    pub difficulty: Difficulty,
    pub source_image: String,
    pub model_version: String,
}

impl ItemDraft {
    /// Promote the draft into a question with a fresh id.
    ///
    /// The draft's own `evidence_facts` are appended after the facts already
    /// in `evidence`.
    pub fn into_question(self, context: QuestionContext, mut evidence: EvidencePack) -> Question {
        evidence.extracted_facts.extend(self.evidence_facts);

        Question {
            item_id: crate::ids::item_id(),
            category: context.category,
            difficulty: context.difficulty,
            stem: self.stem,
            choices: self.choices,
            correct_answer: self.correct_answer,
            explanation: self.explanation,
            evidence,
            source_image: context.source_image,
            generated_at: chrono::Utc::now(),
            model_version: context.model_version,
            visual_spec: None,
            generated_image: None,
        }
    }
}

/// Parse the first JSON object in `text` into an [`ItemDraft`].
///
/// A response with fewer than two choices or with repeated labels is never
/// an item, even when the rest of it is well formed.
pub fn parse_item(text: &str) -> Result<ItemDraft, ItemParseError> {
    let object = extract_json_object(text).ok_or(ItemParseError::NoJson)?;
    let value = Value::Object(object);

    let choice_count = value["choices"].as_array().map(Vec::len).unwrap_or(0);
    if choice_count < 2 {
        return Err(ItemParseError::TooFewChoices(choice_count));
    }

    validate_item_schema(&value).map_err(ItemParseError::Schema)?;

    let draft: ItemDraft = serde_json::from_value(value)?;

    let mut seen = HashSet::new();
    for choice in &draft.choices {
        let label = choice.label.trim().to_ascii_uppercase();
        if !seen.insert(label) {
            return Err(ItemParseError::DuplicateLabel(choice.label.clone()));
        }
    }

    Ok(draft)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"Analysis complete.
```json
{
    "stem": "What is the temperature shown on the thermometer?",
    "choices": [
        {"label": "A", "text": "18°C"},
        {"label": "B", "text": "21°C"},
        {"label": "C", "text": "24°C"},
        {"label": "D", "text": "27°C"}
    ],
    "correct_answer": "B",
    "explanation": "The liquid column stops one tick above 20.",
    "evidence_facts": ["Scale ticks every 1°C", "Column ends at 21"]
}
```"#;

    fn context() -> QuestionContext {
        QuestionContext {
            category: Category::Measurement,
            difficulty: Difficulty::Easy,
            source_image: "thermo.jpg".to_string(),
            model_version: "gemini-test".to_string(),
        }
    }

    #[test]
    fn test_parse_good_item() {
        let draft = parse_item(GOOD).unwrap();
        assert_eq!(draft.choices.len(), 4);
        assert_eq!(draft.correct_answer, "B");
        assert_eq!(draft.evidence_facts.len(), 2);
    }

    #[test]
    fn test_into_question_appends_facts() {
        let draft = parse_item(GOOD).unwrap();
        let evidence = EvidencePack {
            extracted_facts: vec!["Thermometer in Celsius".to_string()],
            ..Default::default()
        };
        let question = draft.into_question(context(), evidence);

        assert!(question.item_id.starts_with("ITEM-"));
        assert_eq!(question.category, Category::Measurement);
        assert_eq!(question.model_version, "gemini-test");
        assert_eq!(
            question.evidence.extracted_facts,
            vec!["Thermometer in Celsius", "Scale ticks every 1°C", "Column ends at 21"]
        );
    }

    #[test]
    fn test_single_choice_is_unparseable() {
        let text = r#"{"stem": "Q", "choices": [{"label": "A", "text": "only"}], "correct_answer": "A"}"#;
        assert!(matches!(parse_item(text), Err(ItemParseError::TooFewChoices(1))));
    }

    #[test]
    fn test_missing_choices_is_unparseable() {
        let text = r#"{"stem": "Q", "correct_answer": "A"}"#;
        assert!(matches!(parse_item(text), Err(ItemParseError::TooFewChoices(0))));
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let text = r#"{"choices": [{"label": "A", "text": "1"}, {"label": "a", "text": "2"}]}"#;
        assert!(matches!(parse_item(text), Err(ItemParseError::DuplicateLabel(_))));
    }

    #[test]
    fn test_schema_violation_reported() {
        let text = r#"{"choices": [{"label": "A", "text": 1}, {"label": "B", "text": "2"}]}"#;
        assert!(matches!(parse_item(text), Err(ItemParseError::Schema(_))));
    }

    #[test]
    fn test_no_json() {
        assert!(matches!(
            parse_item("I could not read the image."),
            Err(ItemParseError::NoJson)
        ));
    }

    #[test]
    fn test_optional_fields_default() {
        let text = r#"{"choices": [{"label": "A", "text": "1"}, {"label": "B", "text": "2"}]}"#;
        let draft = parse_item(text).unwrap();
        assert!(draft.stem.is_empty());
        assert!(draft.correct_answer.is_empty());
        assert!(draft.evidence_facts.is_empty());
    }
}
