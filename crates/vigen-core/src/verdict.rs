//! Judge verdict parsing.
//!
//! Judges answer with `{is_valid, failure_codes, details, recommendations}`.
//! Status resolution:
//! - `is_valid` true → PASS
//! - otherwise any recognised failure code → FAIL
//! - otherwise → REVIEW
//!
//! Unrecognised failure codes are dropped. A response with no JSON object
//! becomes REVIEW; a judge that could not be called at all becomes FAIL with
//! `INVALID_FORMAT`.

use serde_json::{Map, Value};

use crate::extract::extract_json_object;
use crate::types::{FailureCode, ValidationReport, ValidationStatus, ValidatorKind};

/// Parse a judge response into a report.
pub fn parse_verdict(item_id: &str, validator: ValidatorKind, response_text: &str) -> ValidationReport {
    let Some(object) = extract_json_object(response_text) else {
        tracing::debug!(item_id, ?validator, "Judge response contained no JSON object");
        return unparseable_verdict(item_id, validator);
    };

    let is_valid = read_bool(&object, "is_valid");
    let failure_codes = read_codes(&object);

    let status = if is_valid {
        ValidationStatus::Pass
    } else if !failure_codes.is_empty() {
        ValidationStatus::Fail
    } else {
        ValidationStatus::Review
    };

    let mut report = ValidationReport::new(item_id, validator, status);
    report.failure_codes = failure_codes;
    report.details = read_strings(&object, "details");
    report.recommendations = read_strings(&object, "recommendations");
    report
}

/// Report for a judge response that could not be parsed.
pub fn unparseable_verdict(item_id: &str, validator: ValidatorKind) -> ValidationReport {
    let mut report = ValidationReport::new(item_id, validator, ValidationStatus::Review);
    report.details.push("Could not parse the validation response".to_string());
    report.recommendations.push("Manual review required".to_string());
    report
}

/// Report for a judge call that failed before producing a response.
pub fn failed_verdict(item_id: &str, validator: ValidatorKind, error: &str) -> ValidationReport {
    let mut report = ValidationReport::new(item_id, validator, ValidationStatus::Fail);
    report.failure_codes.push(FailureCode::InvalidFormat);
    report.details.push(format!("Validation call failed: {}", error));
    report.recommendations.push("Regenerate the item".to_string());
    report
}

fn read_bool(object: &Map<String, Value>, key: &str) -> bool {
    match object.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn read_codes(object: &Map<String, Value>) -> Vec<FailureCode> {
    let mut codes = Vec::new();
    for raw in read_strings(object, "failure_codes") {
        match FailureCode::parse(&raw) {
            Some(code) if !codes.contains(&code) => codes.push(code),
            Some(_) => {}
            None => tracing::debug!(code = %raw, "Ignoring unknown failure code"),
        }
    }
    codes
}

fn read_strings(object: &Map<String, Value>, key: &str) -> Vec<String> {
    match object.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}
