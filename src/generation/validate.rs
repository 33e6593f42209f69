//! Parsing and normalization of raw provider output.
//!
//! Providers frequently wrap the JSON in prose or fences despite
//! instructions. The validator first tries a direct parse, then the substring
//! between the first `{` and the last `}`, then gives up. After parsing,
//! divergent field names are folded into the contract shape, malformed
//! `sources` entries are dropped rather than failing the response, and the
//! brevity budgets are enforced.

use super::contract::{GenerationContract, SourceRef};
use super::prompt::BrevityLimits;
use serde_json::Value;
use thiserror::Error;

/// A provider response that failed schema validation.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// No JSON object could be extracted from the raw text.
    #[error("provider output contained no parsable JSON object")]
    Parse,
    /// The parsed object is missing a required contract key.
    #[error("provider output missing required key: {0}")]
    MissingField(&'static str),
}

/// Validates raw provider output into a [`GenerationContract`].
#[derive(Debug, Clone, Copy)]
pub struct ResponseValidator {
    limits: BrevityLimits,
}

impl ResponseValidator {
    /// Build a validator enforcing the given brevity limits.
    pub fn new(limits: BrevityLimits) -> Self {
        Self { limits }
    }

    /// Parse, validate, and normalize `raw` into a contract.
    pub fn validate(&self, raw: &str) -> Result<GenerationContract, SchemaError> {
        let value = extract_json_object(raw)?;
        let object = value.as_object().ok_or(SchemaError::Parse)?;

        // Some providers answer with summary/key_points or answer/key_points
        // instead of the requested keys; fold those in here so nothing
        // provider-shaped leaks downstream.
        let one_line = object
            .get("one_line")
            .or_else(|| object.get("summary"))
            .or_else(|| object.get("answer"))
            .and_then(Value::as_str)
            .ok_or(SchemaError::MissingField("one_line"))?;

        let bullets_value = object
            .get("bullets")
            .or_else(|| object.get("key_points"))
            .ok_or(SchemaError::MissingField("bullets"))?;
        let bullets = coerce_bullets(bullets_value);

        let sources = object
            .get("sources")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(coerce_source).collect())
            .unwrap_or_default();

        Ok(GenerationContract {
            one_line: truncate_words(one_line, self.limits.one_line_words),
            bullets: bullets
                .into_iter()
                .take(4)
                .map(|bullet| truncate_words(&bullet, self.limits.bullet_words))
                .collect(),
            sources,
        })
    }
}

fn extract_json_object(raw: &str) -> Result<Value, SchemaError> {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return Ok(value);
    }
    let start = raw.find('{').ok_or(SchemaError::Parse)?;
    let end = raw.rfind('}').ok_or(SchemaError::Parse)?;
    if end <= start {
        return Err(SchemaError::Parse);
    }
    serde_json::from_str(&raw[start..=end]).map_err(|_| SchemaError::Parse)
}

/// A scalar bullet becomes a single-element list; array items that are not
/// strings are stringified rather than dropped.
fn coerce_bullets(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item.as_str() {
                Some(text) => text.to_string(),
                None => item.to_string(),
            })
            .collect(),
        Value::String(text) => vec![text.clone()],
        other => vec![other.to_string()],
    }
}

/// Coerce one `sources` entry to numeric types; `None` drops the entry.
fn coerce_source(entry: &Value) -> Option<SourceRef> {
    let object = entry.as_object()?;
    let note_id = coerce_i64(object.get("note_id")?)?;
    let score = object
        .get("score")
        .and_then(coerce_f64)
        .unwrap_or(0.0);
    Some(SourceRef {
        note_id,
        score: score as f32,
    })
}

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Truncate `text` to at most `budget` words, appending an ellipsis marker
/// when anything was cut.
pub fn truncate_words(text: &str, budget: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= budget {
        return text.trim().to_string();
    }
    let mut truncated = words[..budget].join(" ");
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> ResponseValidator {
        ResponseValidator::new(BrevityLimits {
            one_line_words: 12,
            bullet_words: 8,
        })
    }

    #[test]
    fn direct_json_parses() {
        let contract = validator()
            .validate(r#"{"one_line":"stable","bullets":["a","b"]}"#)
            .expect("valid");
        assert_eq!(contract.one_line, "stable");
        assert_eq!(contract.bullets, vec!["a", "b"]);
        assert!(contract.sources.is_empty());
    }

    #[test]
    fn json_embedded_in_prose_is_extracted() {
        let raw = "Sure! Here is the summary:\n{\"one_line\":\"ok\",\"bullets\":[\"x\"]}\nHope that helps.";
        let contract = validator().validate(raw).expect("valid");
        assert_eq!(contract.one_line, "ok");
    }

    #[test]
    fn missing_required_keys_fail() {
        let error = validator()
            .validate(r#"{"bullets":["x"]}"#)
            .expect_err("missing one_line");
        assert!(matches!(error, SchemaError::MissingField("one_line")));

        let error = validator()
            .validate(r#"{"one_line":"x"}"#)
            .expect_err("missing bullets");
        assert!(matches!(error, SchemaError::MissingField("bullets")));
    }

    #[test]
    fn no_json_at_all_fails() {
        assert!(matches!(
            validator().validate("I could not comply."),
            Err(SchemaError::Parse)
        ));
    }

    #[test]
    fn alternate_field_names_are_normalized() {
        let contract = validator()
            .validate(r#"{"summary":"hypertensive, improving","key_points":["bp trending down"]}"#)
            .expect("valid");
        assert_eq!(contract.one_line, "hypertensive, improving");
        assert_eq!(contract.bullets, vec!["bp trending down"]);
    }

    #[test]
    fn scalar_bullets_become_single_element_list() {
        let contract = validator()
            .validate(r#"{"one_line":"x","bullets":"only one point"}"#)
            .expect("valid");
        assert_eq!(contract.bullets, vec!["only one point"]);
    }

    #[test]
    fn one_line_is_truncated_with_ellipsis() {
        let twenty = (0..20).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let raw = format!(r#"{{"one_line":"{twenty}","bullets":["a"]}}"#);
        let contract = validator().validate(&raw).expect("valid");
        assert_eq!(contract.one_line.split_whitespace().count(), 12);
        assert!(contract.one_line.ends_with("..."));
    }

    #[test]
    fn bullets_are_clipped_to_four() {
        let raw = r#"{"one_line":"x","bullets":["1","2","3","4","5","6"]}"#;
        let contract = validator().validate(raw).expect("valid");
        assert_eq!(contract.bullets.len(), 4);
    }

    #[test]
    fn malformed_sources_are_dropped_not_fatal() {
        let raw = r#"{
            "one_line": "x",
            "bullets": ["a"],
            "sources": [
                {"note_id": 3, "score": 0.9},
                {"note_id": "7", "score": "0.25"},
                {"note_id": "not a number", "score": 0.1},
                {"score": 0.5},
                "garbage"
            ]
        }"#;
        let contract = validator().validate(raw).expect("valid");
        assert_eq!(contract.sources.len(), 2);
        assert_eq!(contract.sources[0].note_id, 3);
        assert_eq!(contract.sources[1].note_id, 7);
        assert!((contract.sources[1].score - 0.25).abs() < 1e-6);
    }

    #[test]
    fn round_trip_through_serialization_validates_equal() {
        let contract = validator()
            .validate(r#"{"one_line":"stable","bullets":["a","b"],"sources":[{"note_id":1,"score":0.5}]}"#)
            .expect("valid");
        let encoded = serde_json::to_string(&contract).expect("encode");
        let revalidated = validator().validate(&encoded).expect("valid");
        assert_eq!(revalidated, contract);
    }
}
