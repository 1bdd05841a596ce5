//! Evidence pack extraction from vision analysis text.
//!
//! Facts are taken verbatim from bullet lines of the model's answer; nothing
//! here checks them against the image.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::EvidencePack;

/// Characters of analysis text kept as the summary.
pub const SUMMARY_CHARS: usize = 500;

/// Characters of code output kept as a fact.
pub const CODE_OUTPUT_CHARS: usize = 200;

lazy_static! {
    // "- fact", "* fact", "• fact"
    static ref BULLET_LINE: Regex = Regex::new(r"^\s*[-*•]+\s*(?P<fact>.*?)\s*$").unwrap();
}

/// Build an evidence pack from analysis text and optional code output.
pub fn extract_evidence(text: &str, code_output: Option<&str>) -> EvidencePack {
    let mut pack = EvidencePack {
        analysis_summary: truncate_chars(text, SUMMARY_CHARS),
        ..Default::default()
    };

    for line in text.lines() {
        if let Some(caps) = BULLET_LINE.captures(line) {
            let fact = caps.name("fact").map(|m| m.as_str()).unwrap_or_default();
            if !fact.is_empty() {
                pack.extracted_facts.push(fact.to_string());
            }
        }
    }

    if let Some(output) = code_output.filter(|o| !o.trim().is_empty()) {
        pack.extracted_facts
            .push(format!("[code output] {}", truncate_chars(output, CODE_OUTPUT_CHARS)));
    }

    pack
}

/// First `max` characters of `s`, never splitting a character.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
