//! Decision rule: turns two judge reports into PASS, RETRY or REJECT.
//!
//! The rule is strict and not configurable:
//! 1. Both reports PASS → PASS
//! 2. Else if the union of failure codes contains a critical code → REJECT
//! 3. Else → RETRY
//!
//! The result does not depend on which report is quality and which is
//! consistency.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::types::{FailureCode, ValidationReport};

/// Failure codes that end an item's life without another attempt.
pub const CRITICAL_CODES: [FailureCode; 2] = [FailureCode::NoVisualEvidence, FailureCode::OutOfScope];

/// Outcome of one validated attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Ship the item
    Pass,
    /// Generate again from scratch
    Retry,
    /// Discard; the image cannot support this item
    Reject,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Pass => write!(f, "PASS"),
            Decision::Retry => write!(f, "RETRY"),
            Decision::Reject => write!(f, "REJECT"),
        }
    }
}

/// Whether `code` bypasses the retry loop.
pub fn is_critical(code: FailureCode) -> bool {
    CRITICAL_CODES.contains(&code)
}

/// Apply the decision rule to a pair of reports.
pub fn decide(quality: &ValidationReport, consistency: &ValidationReport) -> Decision {
    if quality.passed() && consistency.passed() {
        return Decision::Pass;
    }

    let codes = union_codes(quality, consistency);
    if codes.iter().any(|c| is_critical(*c)) {
        return Decision::Reject;
    }

    Decision::Retry
}

/// Failure codes from both reports, deduplicated and ordered.
pub fn union_codes(a: &ValidationReport, b: &ValidationReport) -> BTreeSet<FailureCode> {
    a.codes().union(&b.codes()).copied().collect()
}
