//! Result normalization
//!
//! Maps an arbitrary analysis payload onto [`AnalysisResult`]. Never fails:
//! malformed fields become `None` (or the documented fallback).

use crate::models::{AnalysisPayload, AnalysisResult, ResolutionStatus, SENTIMENT_MAX, SENTIMENT_MIN};
use serde_json::Value;

/// Normalize a raw payload
pub fn normalize(raw: &AnalysisPayload) -> AnalysisResult {
    let resolution_status = field(raw, &["resolution_status", "resolution"])
        .and_then(Value::as_str)
        .map(coerce_resolution)
        .unwrap_or(ResolutionStatus::Unresolved);

    let escalated = field(raw, &["escalated"]).and_then(coerce_bool);
    let escalated = match resolution_status {
        ResolutionStatus::Escalated => Some(true),
        _ => escalated,
    };

    AnalysisResult {
        summary: text_field(raw, &["summary"]),
        coaching: text_field(raw, &["coaching", "coaching_note"]),
        tags: field(raw, &["tags"]).map(normalize_tags).unwrap_or_default(),
        sentiment: field(raw, &["sentiment", "sentiment_score"]).and_then(coerce_sentiment),
        resolution_status,
        escalated,
        call_type: text_field(raw, &["call_type", "type"]),
        persona: field(raw, &["persona"]).cloned(),
        degraded: false,
    }
}

/// Free-text resolution coerced into the enum
pub fn coerce_resolution(raw: &str) -> ResolutionStatus {
    let value = raw.trim().to_lowercase();
    if let Ok(status) = value.parse::<ResolutionStatus>() {
        return status;
    }

    // Substring bucketing only; "not resolved" still contains "resolve"
    if value.contains("resolve") || value.contains("complete") {
        ResolutionStatus::Resolved
    } else if value.contains("follow") || value.contains("pending") {
        ResolutionStatus::Followup
    } else {
        ResolutionStatus::Unresolved
    }
}

/// Numeric sentiment clamped into [1, 10]; negative or non-numeric is `None`
pub fn coerce_sentiment(value: &Value) -> Option<i64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    Some((n.round() as i64).clamp(SENTIMENT_MIN, SENTIMENT_MAX))
}

/// Tags from an array or a comma-separated string
pub fn normalize_tags(value: &Value) -> Vec<String> {
    let candidates: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };

    let mut tags: Vec<String> = Vec::with_capacity(candidates.len());
    for tag in candidates {
        let tag = tag.trim();
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// First non-null value among the aliases
fn field<'a>(raw: &'a AnalysisPayload, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| raw.get(*name).filter(|v| !v.is_null()))
}

/// Non-blank string field
fn text_field(raw: &AnalysisPayload, names: &[&str]) -> Option<String> {
    match field(raw, names)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> AnalysisPayload {
        match value {
            Value::Object(map) => map,
            _ => panic!("test payload must be an object"),
        }
    }

    #[test]
    fn test_sentiment_clamping() {
        let cases = [
            (json!(-5), None),
            (json!(0), Some(1)),
            (json!(1), Some(1)),
            (json!(7), Some(7)),
            (json!(10), Some(10)),
            (json!(15), Some(10)),
            (json!("abc"), None),
            (json!("8"), Some(8)),
            (json!(6.6), Some(7)),
            (json!(true), None),
        ];
        for (input, expected) in cases {
            assert_eq!(coerce_sentiment(&input), expected, "sentiment {}", input);
        }
    }

    #[test]
    fn test_resolution_coercion() {
        let cases = [
            ("resolved", ResolutionStatus::Resolved),
            ("  Escalated ", ResolutionStatus::Escalated),
            ("dispatch", ResolutionStatus::Dispatch),
            ("Issue Resolved on call", ResolutionStatus::Resolved),
            ("completed", ResolutionStatus::Resolved),
            ("needs follow-up", ResolutionStatus::Followup),
            ("pending callback", ResolutionStatus::Followup),
            ("unresolved", ResolutionStatus::Unresolved),
            ("issue not resolved", ResolutionStatus::Resolved),
            ("cannot complete until parts arrive", ResolutionStatus::Resolved),
            ("gibberish", ResolutionStatus::Unresolved),
            ("", ResolutionStatus::Unresolved),
        ];
        for (input, expected) in cases {
            assert_eq!(coerce_resolution(input), expected, "resolution {:?}", input);
        }
    }

    #[test]
    fn test_resolution_coercion_documented_inputs() {
        let cases = [
            ("Resolved", ResolutionStatus::Resolved),
            ("RESOLVED ", ResolutionStatus::Resolved),
            ("marked complete", ResolutionStatus::Resolved),
            ("follow up needed", ResolutionStatus::Followup),
            ("waiting", ResolutionStatus::Unresolved),
            ("xyz", ResolutionStatus::Unresolved),
        ];
        for (input, expected) in cases {
            assert_eq!(coerce_resolution(input), expected, "resolution {:?}", input);
        }
    }

    #[test]
    fn test_tags_from_array_and_string() {
        assert_eq!(
            normalize_tags(&json!(["billing", " refund ", "", "billing"])),
            vec!["billing", "refund"]
        );
        assert_eq!(normalize_tags(&json!("billing, refund,,billing")), vec!["billing", "refund"]);
        assert!(normalize_tags(&json!(42)).is_empty());
    }

    #[test]
    fn test_normalize_full_payload() {
        let result = normalize(&payload(json!({
            "summary": " Customer requested refund ",
            "coaching_note": "Offer callback",
            "tags": ["refund"],
            "sentiment_score": "3",
            "resolution": "pending",
            "escalated": "yes",
            "type": "support",
            "persona": {"mood": "frustrated"}
        })));

        assert_eq!(result.summary.as_deref(), Some("Customer requested refund"));
        assert_eq!(result.coaching.as_deref(), Some("Offer callback"));
        assert_eq!(result.tags, vec!["refund"]);
        assert_eq!(result.sentiment, Some(3));
        assert_eq!(result.resolution_status, ResolutionStatus::Followup);
        assert_eq!(result.escalated, Some(true));
        assert_eq!(result.call_type.as_deref(), Some("support"));
        assert_eq!(result.persona, Some(json!({"mood": "frustrated"})));
        assert!(!result.degraded);
    }

    #[test]
    fn test_missing_fields_are_not_supplied() {
        let result = normalize(&payload(json!({"summary": "only a summary", "tags": null})));
        assert!(result.coaching.is_none());
        assert!(result.tags.is_empty());
        assert!(result.sentiment.is_none());
        assert!(result.escalated.is_none());
        assert_eq!(result.resolution_status, ResolutionStatus::Unresolved);
    }

    #[test]
    fn test_escalated_resolution_implies_flag() {
        let result = normalize(&payload(json!({"resolution_status": "escalated", "escalated": false})));
        assert_eq!(result.escalated, Some(true));
    }
}
