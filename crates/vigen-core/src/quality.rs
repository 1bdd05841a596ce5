//! Structural quality rules.
//!
//! These checks need no model call. They run before the quality judge and a
//! structural failure short-circuits it.
//!
//! | Rule | Code |
//! |------|------|
//! | empty stem | `INVALID_FORMAT` |
//! | fewer than 2 choices | `INVALID_FORMAT` |
//! | empty choice text | `INVALID_FORMAT` |
//! | repeated label | `INVALID_FORMAT` |
//! | answer is not a label | `INVALID_FORMAT` |
//! | two choices with the same text | `OPTION_OVERLAP` |

use std::collections::HashMap;

use crate::types::{FailureCode, Question, ValidationReport, ValidationStatus, ValidatorKind};

/// A rule violation found without a model.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralFinding {
    pub code: FailureCode,
    pub detail: String,
}

impl StructuralFinding {
    fn new(code: FailureCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

/// Result of the structural rules over one question.
#[derive(Debug, Clone, Default)]
pub struct StructuralCheck {
    pub findings: Vec<StructuralFinding>,
    /// Observations that do not fail the item
    pub warnings: Vec<String>,
}

impl StructuralCheck {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// FAIL report carrying every finding. Only meaningful when not clean.
    pub fn into_report(self, item_id: &str) -> ValidationReport {
        let mut report = ValidationReport::new(item_id, ValidatorKind::Quality, ValidationStatus::Fail);
        for finding in self.findings {
            if !report.failure_codes.contains(&finding.code) {
                report.failure_codes.push(finding.code);
            }
            report.details.push(finding.detail);
        }
        report.details.extend(self.warnings);
        report.recommendations.push("Regenerate the item with a well-formed choice set".to_string());
        report
    }
}

/// Run every structural rule.
pub fn check_structure(question: &Question) -> StructuralCheck {
    let mut check = StructuralCheck::default();

    if question.stem.trim().is_empty() {
        check.findings.push(StructuralFinding::new(FailureCode::InvalidFormat, "Stem is empty"));
    }

    if question.choices.len() < 2 {
        check.findings.push(StructuralFinding::new(
            FailureCode::InvalidFormat,
            format!("Only {} choice(s); at least 2 required", question.choices.len()),
        ));
    }

    let mut labels: HashMap<String, usize> = HashMap::new();
    let mut texts: HashMap<String, &str> = HashMap::new();
    for choice in &question.choices {
        let label = choice.label.trim().to_ascii_uppercase();
        *labels.entry(label).or_default() += 1;

        let text = normalize(&choice.text);
        if text.is_empty() {
            check.findings.push(StructuralFinding::new(
                FailureCode::InvalidFormat,
                format!("Choice {} has no text", choice.label),
            ));
            continue;
        }
        if let Some(previous) = texts.insert(text, choice.label.as_str()) {
            check.findings.push(StructuralFinding::new(
                FailureCode::OptionOverlap,
                format!("Choices {} and {} have the same text", previous, choice.label),
            ));
        }
    }

    let mut repeated: Vec<&String> = labels.iter().filter(|(_, n)| **n > 1).map(|(l, _)| l).collect();
    repeated.sort();
    for label in repeated {
        check.findings.push(StructuralFinding::new(
            FailureCode::InvalidFormat,
            format!("Label {} is used more than once", label),
        ));
    }

    if question.correct_choice().is_none() {
        check.findings.push(StructuralFinding::new(
            FailureCode::InvalidFormat,
            format!(
                "Correct answer '{}' is not one of the labels {:?}",
                question.correct_answer,
                question.labels()
            ),
        ));
    }

    if question.explanation.trim().is_empty() {
        check.warnings.push("Explanation is empty".to_string());
    }
    if question.evidence.extracted_facts.is_empty() {
        check.warnings.push("No evidence facts were extracted".to_string());
    }

    check
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, Choice, Difficulty, EvidencePack};
    use chrono::Utc;

    fn question(choices: Vec<Choice>, answer: &str) -> Question {
        Question {
            item_id: "ITEM-QA".to_string(),
            category: Category::Geometry,
            difficulty: Difficulty::Medium,
            stem: "What is the angle at B?".to_string(),
            choices,
            correct_answer: answer.to_string(),
            explanation: "Marked as a right angle.".to_string(),
            evidence: EvidencePack {
                extracted_facts: vec!["Square marker at B".to_string()],
                ..Default::default()
            },
            source_image: "tri.png".to_string(),
            generated_at: Utc::now(),
            model_version: String::new(),
            visual_spec: None,
            generated_image: None,
        }
    }

    fn abcd() -> Vec<Choice> {
        vec![
            Choice::new("A", "30°"),
            Choice::new("B", "45°"),
            Choice::new("C", "60°"),
            Choice::new("D", "90°"),
        ]
    }

    #[test]
    fn test_clean_question() {
        let check = check_structure(&question(abcd(), "D"));
        assert!(check.is_clean(), "{:?}", check.findings);
        assert!(check.warnings.is_empty());
    }

    #[test]
    fn test_answer_not_a_label() {
        let check = check_structure(&question(abcd(), "E"));
        assert_eq!(check.findings.len(), 1);
        assert_eq!(check.findings[0].code, FailureCode::InvalidFormat);
    }

    #[test]
    fn test_duplicate_text_is_overlap() {
        let mut choices = abcd();
        choices[2].text = " 45° ".to_string();
        let check = check_structure(&question(choices, "A"));
        assert_eq!(check.findings.len(), 1);
        assert_eq!(check.findings[0].code, FailureCode::OptionOverlap);
        assert!(check.findings[0].detail.contains('B'));
    }

    #[test]
    fn test_empty_stem_and_repeated_label() {
        let mut q = question(abcd(), "A");
        q.stem = "  ".to_string();
        q.choices[1].label = "a".to_string();
        let check = check_structure(&q);
        let codes: Vec<_> = check.findings.iter().map(|f| f.code).collect();
        assert_eq!(codes, vec![FailureCode::InvalidFormat, FailureCode::InvalidFormat]);
    }

    #[test]
    fn test_warnings_do_not_fail() {
        let mut q = question(abcd(), "B");
        q.explanation.clear();
        q.evidence.extracted_facts.clear();
        let check = check_structure(&q);
        assert!(check.is_clean());
        assert_eq!(check.warnings.len(), 2);
    }

    #[test]
    fn test_into_report_collapses_codes() {
        let mut q = question(abcd(), "Z");
        q.stem.clear();
        let report = check_structure(&q).into_report(&q.item_id);
        assert_eq!(report.status, ValidationStatus::Fail);
        assert_eq!(report.failure_codes, vec![FailureCode::InvalidFormat]);
        assert_eq!(report.details.len(), 2);
        assert_eq!(report.validator, ValidatorKind::Quality);
    }
}
