//! LLM response parsing
//!
//! The model is asked for bare JSON but routinely wraps it in a markdown
//! fence, prefixes prose, or stops before closing the fence. Extraction tries
//! a fenced block first and then falls back to brace matching.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::LlmStructuredResponse;

lazy_static! {
    static ref FENCED_JSON: Regex =
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fenced JSON pattern is valid");
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("Could not find JSON object in LLM response.")]
    NoJsonObject,
    #[error("Failed to decode JSON from LLM response: {0}")]
    Decode(String),
    #[error("LLM response failed schema validation: {0}")]
    Schema(String),
}

/// Returns the balanced `{...}` object starting at the first `{`, ignoring
/// braces inside string literals.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    // Unbalanced (usually truncated output): widest span, let the decoder judge it
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Candidate JSON snippets in the order they should be tried.
pub fn json_candidates(text: &str) -> Vec<&str> {
    let mut candidates = Vec::new();
    if let Some(fenced) = FENCED_JSON.captures(text).and_then(|c| c.get(1)) {
        candidates.push(fenced.as_str());
    }
    if let Some(object) = balanced_object(text) {
        if !candidates.contains(&object) {
            candidates.push(object);
        }
    }
    candidates
}

/// Extracts the first decodable JSON object from free text.
pub fn extract_json_object(text: &str) -> Result<Value, ParseError> {
    let candidates = json_candidates(text);
    if candidates.is_empty() {
        warn!("Could not find JSON object in LLM response.");
        return Err(ParseError::NoJsonObject);
    }

    let mut last_error = None;
    for candidate in candidates {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) if value.is_object() => return Ok(value),
            Ok(_) => last_error = Some("top-level value is not an object".to_string()),
            Err(e) => {
                debug!("Candidate JSON rejected: {}", e);
                last_error = Some(e.to_string());
            }
        }
    }

    Err(ParseError::Decode(last_error.unwrap_or_default()))
}

pub fn parse_llm_response(text: &str) -> Result<LlmStructuredResponse, ParseError> {
    let value = extract_json_object(text)?;
    serde_json::from_value(value).map_err(|e| {
        warn!("LLM response failed schema validation: {}", e);
        ParseError::Schema(e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
  "potential_root_causes": ["Underlying user-service instance crashing."],
  "recommended_actions": ["Check user-service logs for errors."],
  "potential_impact": "API unavailability.",
  "confidence_explanation": "Common pattern for 503 errors."
}"#;

    #[test]
    fn test_bare_json() {
        let parsed = parse_llm_response(VALID).unwrap();
        assert_eq!(parsed.potential_root_causes.len(), 1);
        assert_eq!(parsed.potential_impact.as_deref(), Some("API unavailability."));
    }

    #[test]
    fn test_fenced_json_with_prose() {
        let text = format!("Here is my analysis:\n```json\n{}\n```\nLet me know.", VALID);
        let parsed = parse_llm_response(&text).unwrap();
        assert_eq!(parsed.recommended_actions[0].description, "Check user-service logs for errors.");
    }

    #[test]
    fn test_unopened_fence_after_prompt() {
        // The prompt ends with an opening fence, so replies often only close it
        let text = format!("{}\n```\n", VALID);
        assert!(parse_llm_response(&text).is_ok());
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_matching() {
        let text = r#"Result: {"potential_root_causes": ["bad config {x}"], "recommended_actions": ["fix \"}\" now"]} trailing }"#;
        let parsed = parse_llm_response(text).unwrap();
        assert_eq!(parsed.potential_root_causes[0].description, "bad config {x}");
        assert_eq!(parsed.recommended_actions[0].description, "fix \"}\" now");
    }

    #[test]
    fn test_no_json_object() {
        let err = parse_llm_response("Sorry, I encountered an error generating the JSON.").unwrap_err();
        assert_eq!(err, ParseError::NoJsonObject);
        assert_eq!(err.to_string(), "Could not find JSON object in LLM response.");
    }

    #[test]
    fn test_undecodable_json() {
        let err = parse_llm_response("{ potential_root_causes: nope }").unwrap_err();
        assert!(matches!(err, ParseError::Decode(_)));
        assert!(err.to_string().starts_with("Failed to decode JSON from LLM response"));
    }

    #[test]
    fn test_schema_violation() {
        let err = parse_llm_response(r#"{"potential_root_causes": "just one string"}"#).unwrap_err();
        assert!(matches!(err, ParseError::Schema(_)));
    }

    #[test]
    fn test_fenced_block_preferred_over_earlier_braces() {
        let text = format!("Note {{see below}}\n```json\n{}\n```", VALID);
        let candidates = json_candidates(&text);
        assert_eq!(candidates[0], VALID);
        assert!(parse_llm_response(&text).is_ok());
    }
}
