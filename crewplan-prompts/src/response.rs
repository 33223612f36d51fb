//! Parsing of provider output into raw proposals
//!
//! Providers answer with a JSON array of proposals, an object carrying a
//! `proposals` array, or free text (often fenced markdown) that embeds one of
//! those. Elements that do not deserialize are dropped here; field validation
//! happens later when proposals become candidates.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crewplan_core::pipeline::RawProposal;

use crate::{Error, Result};

/// Envelope keys that may hold the proposal list
const LIST_KEYS: &[&str] = &["proposals", "solutions"];
/// Envelope keys that may hold text to parse again
const TEXT_KEYS: &[&str] = &["content", "text", "output", "completion"];

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("fence pattern is valid")
    })
}

/// Parse provider output text
pub fn parse_proposals(text: &str) -> Result<Vec<RawProposal>> {
    parse_text(text, 0)
}

/// Envelopes may carry text that is itself parsed once more
const MAX_DEPTH: usize = 1;

fn parse_text(text: &str, depth: usize) -> Result<Vec<RawProposal>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::UnparseableResponse("empty response".to_string()));
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(proposals) = from_value(value, depth) {
            return Ok(proposals);
        }
    }

    for captures in fence_pattern().captures_iter(trimmed) {
        let Some(body) = captures.get(1) else { continue };
        if let Ok(value) = serde_json::from_str::<Value>(body.as_str().trim()) {
            if let Some(proposals) = from_value(value, depth) {
                debug!("Parsed proposals from fenced block");
                return Ok(proposals);
            }
        }
    }

    if let Some(value) = embedded_json(trimmed) {
        if let Some(proposals) = from_value(value, depth) {
            debug!("Parsed proposals embedded in prose");
            return Ok(proposals);
        }
    }

    Err(Error::UnparseableResponse(preview(trimmed)))
}

/// Proposals from a parsed JSON document, unwrapping known envelopes
fn from_value(value: Value, depth: usize) -> Option<Vec<RawProposal>> {
    match value {
        Value::Array(items) => Some(collect_items(items)),
        Value::Object(mut map) => {
            for key in LIST_KEYS {
                if let Some(Value::Array(items)) = map.remove(*key) {
                    return Some(collect_items(items));
                }
            }
            if depth < MAX_DEPTH {
                for key in TEXT_KEYS {
                    if let Some(Value::String(text)) = map.remove(*key) {
                        return parse_text(&text, depth + 1).ok();
                    }
                }
            }
            // A single bare proposal object
            if map.contains_key("strategy") {
                return Some(collect_items(vec![Value::Object(map)]));
            }
            None
        }
        Value::String(text) if depth < MAX_DEPTH => parse_text(&text, depth + 1).ok(),
        _ => None,
    }
}

fn collect_items(items: Vec<Value>) -> Vec<RawProposal> {
    let total = items.len();
    let proposals: Vec<RawProposal> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<RawProposal>(item) {
            Ok(proposal) => Some(proposal),
            Err(err) => {
                warn!(error = %err, "Dropping malformed proposal element");
                None
            }
        })
        .collect();
    if proposals.len() < total {
        debug!(kept = proposals.len(), total, "Some proposal elements were malformed");
    }
    proposals
}

/// Widest `[...]` or `{...}` span that parses as JSON
fn embedded_json(text: &str) -> Option<Value> {
    for (open, close) in [('[', ']'), ('{', '}')] {
        let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) else {
            continue;
        };
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
                return Some(value);
            }
        }
    }
    None
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 120;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let head: String = text.chars().take(LIMIT).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARRAY: &str = r#"[
        {"strategy": "MOVE_NONCRITICAL", "description": "Move B to Monday", "reasoning": "slack",
         "feasibility": 0.8, "complexity": 0.3, "preserves_deadline": true},
        {"strategy": "EXTEND_DURATION", "description": "Stretch A", "feasibility_score": 0.6,
         "complexity_score": 0.5, "preserves_deadline": false,
         "impact_analysis": {"affected_tasks": ["T-a1"], "days_impact": 2, "resources_needed": 0}}
    ]"#;

    #[test]
    fn test_plain_array() {
        let proposals = parse_proposals(ARRAY).unwrap();
        assert_eq!(proposals.len(), 2);
        assert_eq!(proposals[0].strategy.as_deref(), Some("MOVE_NONCRITICAL"));
        assert_eq!(proposals[1].feasibility, Some(0.6));
        assert_eq!(proposals[1].impact.as_ref().map(|i| i.days_impact), Some(2));
    }

    #[test]
    fn test_proposals_envelope() {
        let text = format!(r#"{{"proposals": {}}}"#, ARRAY);
        assert_eq!(parse_proposals(&text).unwrap().len(), 2);
    }

    #[test]
    fn test_fenced_block_in_prose() {
        let text = format!("Here are my suggestions:\n```json\n{}\n```\nLet me know.", ARRAY);
        assert_eq!(parse_proposals(&text).unwrap().len(), 2);
    }

    #[test]
    fn test_text_envelope_with_fence() {
        let inner = format!("```\n{}\n```", ARRAY);
        let text = serde_json::json!({ "content": inner }).to_string();
        assert_eq!(parse_proposals(&text).unwrap().len(), 2);
    }

    #[test]
    fn test_embedded_without_fence() {
        let text = format!("Sure. {} Hope this helps.", ARRAY);
        assert_eq!(parse_proposals(&text).unwrap().len(), 2);
    }

    #[test]
    fn test_single_object() {
        let text = r#"{"strategy": "EXTEND_DURATION", "description": "Stretch A"}"#;
        assert_eq!(parse_proposals(text).unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_elements_are_dropped() {
        let text = r#"[{"strategy": "MOVE_NONCRITICAL", "feasibility": "high"}, {"strategy": "EXTEND_DURATION"}]"#;
        let proposals = parse_proposals(text).unwrap();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].strategy.as_deref(), Some("EXTEND_DURATION"));
    }

    #[test]
    fn test_empty_array_is_a_valid_answer() {
        assert!(parse_proposals("[]").unwrap().is_empty());
    }

    #[test]
    fn test_unparseable_text() {
        let err = parse_proposals("I cannot help with that.").unwrap_err();
        assert!(matches!(err, Error::UnparseableResponse(_)));
        assert!(parse_proposals("   ").is_err());
    }
}
