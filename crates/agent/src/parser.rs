//! Turns raw model text into an [`AgentResponse`].
//!
//! Parsing never fails. Every malformed input maps to a fixed, non-empty
//! fallback response with no actions.

use serde_json::{Map, Value};
use tidemark_core::map::{AgentResponse, MapAction};
use tracing::{debug, warn};

/// Returned when the model produced nothing at all.
pub const NO_RESPONSE: &str = "No response received from AI service";

/// Returned when the JSON object has no usable `response` field.
pub const MISSING_RESPONSE: &str = "I can help you explore Hawaii's sea level rise and flooding \
     data. Ask me about a place or a hazard and I'll show it on the map.";

/// Returned when the output is neither JSON nor meaningful prose.
pub const REPHRASE: &str = "I encountered an issue understanding that request. Could you please \
     rephrase your question?";

/// Returned when the output decodes but is not a JSON object.
pub const FORMAT: &str = "I had trouble formatting my response. Please try asking again.";

/// Prose shorter than this is treated as noise rather than an answer.
pub const DEFAULT_MIN_PROSE_LEN: usize = 40;

const FENCES: [&str; 3] = ["```json", "```JSON", "```"];

#[derive(Debug, Clone)]
pub struct ResponseParser {
    min_prose_len: usize,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self {
            min_prose_len: DEFAULT_MIN_PROSE_LEN,
        }
    }
}

impl ResponseParser {
    pub fn new(min_prose_len: usize) -> Self {
        Self { min_prose_len }
    }

    /// Parse raw model output. The parser never truncates the action list.
    pub fn parse(&self, raw: &str) -> AgentResponse {
        let text = raw.trim();
        if text.is_empty() {
            return AgentResponse::text(NO_RESPONSE);
        }

        match serde_json::from_str::<Value>(json_candidate(text)) {
            Ok(value) => self.from_value(value),
            Err(e) => {
                debug!(error = %e, "Model output is not JSON, treating as prose");
                let cleaned = strip_fences(text);
                if cleaned.chars().count() >= self.min_prose_len {
                    AgentResponse::text(cleaned)
                } else {
                    AgentResponse::text(REPHRASE)
                }
            }
        }
    }

    fn from_value(&self, value: Value) -> AgentResponse {
        let Value::Object(mut object) = value else {
            warn!("Model output decoded to a non-object JSON value");
            return AgentResponse::text(FORMAT);
        };

        let response = match object.get("response").and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => s.to_string(),
            _ => MISSING_RESPONSE.to_string(),
        };

        let entries = match object.remove("map_actions") {
            Some(Value::Array(entries)) => entries,
            _ => Vec::new(),
        };

        let actions = entries
            .into_iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let action = to_action(entry);
                if action.is_none() {
                    warn!(index = i, "Dropping map action without a string 'type'");
                }
                action
            })
            .collect();

        AgentResponse::with_actions(response, actions)
    }
}

/// From the first `{` to the last `}` when both exist in that order.
fn json_candidate(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

fn strip_fences(text: &str) -> String {
    let mut cleaned = text.to_string();
    for fence in FENCES {
        cleaned = cleaned.replace(fence, "");
    }
    cleaned.trim().to_string()
}

/// Accepts both `{"type", "parameters": {...}}` and flat per-action fields.
/// Flat fields are folded into `parameters`; an explicit `parameters`
/// object wins on key collisions.
fn to_action(entry: Value) -> Option<MapAction> {
    let Value::Object(mut fields) = entry else {
        return None;
    };
    let action_type = match fields.remove("type") {
        Some(Value::String(t)) => t,
        _ => return None,
    };

    let nested = match fields.remove("parameters") {
        Some(Value::Object(params)) => params,
        _ => Map::new(),
    };

    let mut parameters = fields;
    parameters.extend(nested);

    Some(MapAction {
        action_type,
        parameters,
    })
}
