//! JSON extraction for free-text LLM responses.
//!
//! Providers often wrap JSON in markdown code blocks or surround it with
//! conversational text, even when told not to.

use serde_json::{Map, Value};

use crate::error::ProviderError;

const EXCERPT_CHARS: usize = 200;

/// Extract a JSON object from an LLM response.
///
/// Tries, in order:
/// 1. A fenced block labeled `json` or unlabeled
/// 2. The whole trimmed response
/// 3. The span from the first `{` to the last `}`
///
/// The first strategy that parses to an object wins.
pub fn extract_json_object(response: &str) -> Result<Map<String, Value>, ProviderError> {
    let trimmed = response.trim();

    fenced_blocks(trimmed)
        .into_iter()
        .find_map(parse_object)
        .or_else(|| parse_object(trimmed))
        .or_else(|| outer_braces(trimmed).and_then(parse_object))
        .ok_or_else(|| ProviderError::MalformedResponse {
            excerpt: excerpt(trimmed),
        })
}

/// Contents of every ```json or unlabeled ``` fence, in order.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after_ticks = &rest[open + 3..];
        let (label, body) = match after_ticks.find('\n') {
            Some(nl) => (&after_ticks[..nl], &after_ticks[nl + 1..]),
            None => ("", after_ticks),
        };
        let Some(close) = body.find("```") else {
            break;
        };

        let label = label.trim();
        if label.is_empty() || label.eq_ignore_ascii_case("json") {
            blocks.push(body[..close].trim());
        }
        rest = &body[close + 3..];
    }

    blocks
}

fn outer_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn excerpt(text: &str) -> String {
    let mut out: String = text.chars().take(EXCERPT_CHARS).collect();
    if text.chars().count() > EXCERPT_CHARS {
        out.push_str("...");
    }
    out
}
