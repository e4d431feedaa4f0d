//! Analysis service response envelope
//!
//! The service answers in one of several shapes. [`ResponseEnvelope::classify`]
//! picks exactly one shape with a fixed priority, and [`ResponseEnvelope::into_payload`]
//! extracts the analysis object from it. Anything that does not yield a JSON
//! object is a parse failure.

use crate::models::AnalysisPayload;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// ```json ... ``` (or bare ``` ... ```) block inside free text
static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").expect("fenced block pattern is valid")
});

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEnvelope {
    /// `{"json": {...}}`: structured output already parsed by the service
    Structured(Value),
    /// `{"text": "..."}`: model output as text, JSON possibly fenced
    Text(String),
    /// Object with neither `json` nor `text`: the analysis itself
    Direct(AnalysisPayload),
    /// Anything else
    Unrecognized(Value),
}

impl ResponseEnvelope {
    /// Discriminate a response body
    ///
    /// Priority: `json` field, then `text` field, then the bare object.
    pub fn classify(body: Value) -> Self {
        match body {
            Value::Object(mut map) => {
                if let Some(json) = map.remove("json") {
                    if !json.is_null() {
                        return ResponseEnvelope::Structured(json);
                    }
                }
                match map.remove("text") {
                    Some(Value::String(text)) => ResponseEnvelope::Text(text),
                    Some(other) => ResponseEnvelope::Unrecognized(other),
                    None => ResponseEnvelope::Direct(map),
                }
            }
            other => ResponseEnvelope::Unrecognized(other),
        }
    }

    /// Extract the analysis object, or describe why none was found
    pub fn into_payload(self) -> Result<AnalysisPayload, String> {
        match self {
            ResponseEnvelope::Structured(Value::Object(map)) => Ok(map),
            // Some flows return the structured output serialized as a string
            ResponseEnvelope::Structured(Value::String(s)) => parse_object(&s)
                .ok_or_else(|| "json field is a string that is not a JSON object".to_string()),
            ResponseEnvelope::Structured(other) => {
                Err(format!("json field is not an object: {}", kind_of(&other)))
            }
            ResponseEnvelope::Text(text) => parse_text(&text),
            ResponseEnvelope::Direct(map) if map.is_empty() => Err("empty response object".to_string()),
            ResponseEnvelope::Direct(map) => Ok(map),
            ResponseEnvelope::Unrecognized(value) => {
                Err(format!("unrecognized response shape: {}", kind_of(&value)))
            }
        }
    }
}

/// Whole-text JSON first, then the first fenced block
fn parse_text(text: &str) -> Result<AnalysisPayload, String> {
    if let Some(map) = parse_object(text) {
        return Ok(map);
    }

    for caps in FENCED_BLOCK.captures_iter(text) {
        if let Some(map) = caps.get(1).and_then(|m| parse_object(m.as_str())) {
            return Ok(map);
        }
    }

    Err("text field contains no JSON object".to_string())
}

fn parse_object(s: &str) -> Option<AnalysisPayload> {
    match serde_json::from_str::<Value>(s.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(body: Value) -> Result<AnalysisPayload, String> {
        ResponseEnvelope::classify(body).into_payload()
    }

    #[test]
    fn test_json_field_wins_over_text() {
        let body = json!({"json": {"summary": "from json"}, "text": "{\"summary\": \"from text\"}"});
        let map = payload(body).unwrap();
        assert_eq!(map["summary"], "from json");
    }

    #[test]
    fn test_text_parsed_as_whole_json() {
        let map = payload(json!({"text": " {\"summary\": \"ok\", \"tags\": [\"a\"]} "})).unwrap();
        assert_eq!(map["summary"], "ok");
    }

    #[test]
    fn test_text_with_fenced_block() {
        let text = "Here is the analysis:\n```json\n{\"summary\": \"fenced\"}\n```\nThanks.";
        let map = payload(json!({ "text": text })).unwrap();
        assert_eq!(map["summary"], "fenced");
    }

    #[test]
    fn test_text_with_bare_fence() {
        let text = "```\n{\"summary\": \"bare\"}\n```";
        let map = payload(json!({ "text": text })).unwrap();
        assert_eq!(map["summary"], "bare");
    }

    #[test]
    fn test_prose_text_is_parse_failure() {
        assert!(payload(json!({"text": "I could not analyze this call."})).is_err());
    }

    #[test]
    fn test_direct_object() {
        let map = payload(json!({"summary": "direct", "sentiment": 7})).unwrap();
        assert_eq!(map["sentiment"], 7);
    }

    #[test]
    fn test_null_json_field_falls_through() {
        let map = payload(json!({"json": null, "text": "{\"summary\": \"t\"}"})).unwrap();
        assert_eq!(map["summary"], "t");
    }

    #[test]
    fn test_non_object_shapes_fail_closed() {
        assert!(payload(json!([1, 2, 3])).is_err());
        assert!(payload(json!("summary")).is_err());
        assert!(payload(json!({"json": [1]})).is_err());
        assert!(payload(json!({"text": 42})).is_err());
        assert!(payload(json!({})).is_err());
    }
}
