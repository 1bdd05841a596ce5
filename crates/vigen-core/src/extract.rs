//! Structured-result extraction from free-text model responses.
//!
//! Models are asked to answer with a JSON object but routinely wrap it in
//! prose or a fenced code block. Extraction never fails loudly: when no
//! well-formed object can be located the caller gets `None` and treats the
//! response as unparseable.
//!
//! Search order:
//! 1. Fenced blocks tagged `json`
//! 2. Any other fenced block
//! 3. A brace-balanced scan of the raw text

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

lazy_static! {
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)```").unwrap();
}

/// Find the first well-formed JSON object embedded in `text`.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let blocks: Vec<(String, &str)> = FENCED_BLOCK
        .captures_iter(text)
        .filter_map(|caps| {
            let tag = caps.get(1).map(|m| m.as_str().to_ascii_lowercase())?;
            let body = caps.get(2)?.as_str();
            Some((tag, body))
        })
        .collect();

    let tagged = blocks.iter().filter(|(tag, _)| tag == "json");
    let untagged = blocks.iter().filter(|(tag, _)| tag != "json");

    for (_, body) in tagged.chain(untagged) {
        if let Some(object) = scan_for_object(body) {
            return Some(object);
        }
    }

    scan_for_object(text)
}

/// Extract the first JSON object and deserialize it into `T`.
///
/// Returns `None` both when no object is found and when the object does not
/// match `T`.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Option<T> {
    let object = extract_json_object(text)?;
    serde_json::from_value(Value::Object(object)).ok()
}

/// Try every `{` in order until a balanced span parses as an object.
fn scan_for_object(text: &str) -> Option<Map<String, Value>> {
    let bytes = text.as_bytes();
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find('{') {
        let start = cursor + offset;
        if let Some(end) = balanced_end(bytes, start) {
            if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(&text[start..=end]) {
                return Some(object);
            }
        }
        cursor = start + 1;
    }

    None
}

/// Index of the `}` closing the object opened at `start`.
///
/// String literals and escapes are honoured so braces inside strings do not
/// count. Works on bytes: `{`, `}`, `"` and `\` never occur inside a
/// multi-byte UTF-8 sequence.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_fenced_json_block() {
        let text = "Here is the item:\n```json\n{\"stem\": \"Q?\", \"n\": 2}\n```\nDone.";
        let object = extract_json_object(text).unwrap();
        assert_eq!(object["stem"], "Q?");
        assert_eq!(object["n"], 2);
    }

    #[test]
    fn test_json_block_preferred_over_earlier_code_block() {
        let text = "```python\nprint({'a': 1})\n```\n```json\n{\"picked\": true}\n```";
        let object = extract_json_object(text).unwrap();
        assert_eq!(object["picked"], true);
    }

    #[test]
    fn test_untagged_fence() {
        let text = "```\n{\"is_valid\": false}\n```";
        let object = extract_json_object(text).unwrap();
        assert_eq!(object["is_valid"], false);
    }

    #[test]
    fn test_bare_object_in_prose() {
        let text = "I looked closely. {\"answer\": \"C\"} That is my final answer.";
        let object = extract_json_object(text).unwrap();
        assert_eq!(object["answer"], "C");
    }

    #[test]
    fn test_braces_inside_strings() {
        let text = r#"Result: {"stem": "Solve {x | x > 2}", "note": "a \"quoted\" }"}"#;
        let object = extract_json_object(text).unwrap();
        assert_eq!(object["stem"], "Solve {x | x > 2}");
    }

    #[test]
    fn test_skips_malformed_candidate() {
        let text = "{not json at all} then {\"ok\": 1}";
        let object = extract_json_object(text).unwrap();
        assert_eq!(object["ok"], 1);
    }

    #[test]
    fn test_non_ascii_text() {
        let text = "결과는 다음과 같습니다 {\"stem\": \"그래프에서 가장 큰 값은?\"}";
        let object = extract_json_object(text).unwrap();
        assert_eq!(object["stem"], "그래프에서 가장 큰 값은?");
    }

    #[test]
    fn test_no_object_returns_none() {
        assert!(extract_json_object("").is_none());
        assert!(extract_json_object("no structure here").is_none());
        assert!(extract_json_object("[1, 2, 3]").is_none());
        assert!(extract_json_object("{\"unterminated\": ").is_none());
    }

    #[test]
    fn test_typed_extraction() {
        #[derive(serde::Deserialize)]
        struct Verdict {
            is_valid: bool,
        }
        let verdict: Verdict = extract_json("```json\n{\"is_valid\": true}\n```").unwrap();
        assert!(verdict.is_valid);
        assert!(extract_json::<Verdict>("{\"other\": 1}").is_none());
    }

    #[test]
    fn test_nested_object() {
        let text = "```json\n{\"a\": {\"b\": {\"c\": [1, {\"d\": 2}]}}}\n```";
        let object = extract_json_object(text).unwrap();
        assert_eq!(Value::Object(object), json!({"a": {"b": {"c": [1, {"d": 2}]}}}));
    }

    fn arb_object() -> impl Strategy<Value = Map<String, Value>> {
        let leaf = prop_oneof![
            any::<bool>().prop_map(Value::from),
            any::<i32>().prop_map(Value::from),
            "[a-zA-Z0-9 {}\"\\\\]{0,12}".prop_map(Value::from),
        ];
        prop::collection::btree_map("[a-z_]{1,8}", leaf, 0..6)
            .prop_map(|m| m.into_iter().collect::<Map<String, Value>>())
    }

    proptest! {
        #[test]
        fn prop_extraction_is_idempotent(
            object in arb_object(),
            prefix in "[a-zA-Z .,:]{0,30}",
            suffix in "[a-zA-Z .,:]{0,30}",
            fenced in any::<bool>(),
        ) {
            let body = serde_json::to_string_pretty(&Value::Object(object.clone())).unwrap();
            let text = if fenced {
                format!("{}\n```json\n{}\n```\n{}", prefix, body, suffix)
            } else {
                format!("{} {} {}", prefix, body, suffix)
            };

            let first = extract_json_object(&text).unwrap();
            prop_assert_eq!(&first, &object);

            let reserialized = serde_json::to_string(&Value::Object(first.clone())).unwrap();
            let second = extract_json_object(&reserialized).unwrap();
            prop_assert_eq!(second, first);
        }
    }
}
