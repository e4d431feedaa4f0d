//! Canonical analysis result shape

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Raw JSON object returned by the analysis service, before normalization
pub type AnalysisPayload = serde_json::Map<String, serde_json::Value>;

/// Tag carried by every degraded result
pub const DEGRADED_TAG: &str = "analysis_failed";

/// Midpoint of the 1..=10 sentiment scale
pub const NEUTRAL_SENTIMENT: i64 = 5;

pub const SENTIMENT_MIN: i64 = 1;
pub const SENTIMENT_MAX: i64 = 10;

const DEGRADED_SUMMARY: &str = "Automated analysis failed; transcript requires manual review.";
const DEGRADED_CALL_TYPE: &str = "unknown";

/// Call resolution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    Resolved,
    Followup,
    Unresolved,
    Escalated,
    Dispatch,
}

impl ResolutionStatus {
    pub const ALL: [ResolutionStatus; 5] = [
        ResolutionStatus::Resolved,
        ResolutionStatus::Followup,
        ResolutionStatus::Unresolved,
        ResolutionStatus::Escalated,
        ResolutionStatus::Dispatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStatus::Resolved => "resolved",
            ResolutionStatus::Followup => "followup",
            ResolutionStatus::Unresolved => "unresolved",
            ResolutionStatus::Escalated => "escalated",
            ResolutionStatus::Dispatch => "dispatch",
        }
    }
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact (case-sensitive) member lookup; free-text coercion lives in the normalizer
impl FromStr for ResolutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResolutionStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown resolution status: {}", s))
    }
}

/// Normalized output of one analysis call
///
/// `None` means "not supplied by this analysis": the reconciler keeps
/// whatever the stores already hold for that field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: Option<String>,
    pub coaching: Option<String>,
    /// Ordered, duplicate-free
    pub tags: Vec<String>,
    /// Always within [1, 10] when present
    pub sentiment: Option<i64>,
    pub resolution_status: ResolutionStatus,
    pub escalated: Option<bool>,
    pub call_type: Option<String>,
    pub persona: Option<serde_json::Value>,
    /// True for the fixed placeholder produced when analysis could not complete
    #[serde(default)]
    pub degraded: bool,
}

impl AnalysisResult {
    /// Fixed placeholder for a call that could not be analyzed
    pub fn degraded() -> Self {
        Self {
            summary: Some(DEGRADED_SUMMARY.to_string()),
            coaching: None,
            tags: vec![DEGRADED_TAG.to_string()],
            sentiment: Some(NEUTRAL_SENTIMENT),
            resolution_status: ResolutionStatus::Unresolved,
            escalated: Some(false),
            call_type: Some(DEGRADED_CALL_TYPE.to_string()),
            persona: None,
            degraded: true,
        }
    }

    /// Comma-joined tag string; the only place the joined form is produced
    pub fn tags_joined(&self) -> String {
        self.tags.join(",")
    }

    /// Tag list as a JSON array string
    pub fn tags_json(&self) -> String {
        serde_json::Value::from(self.tags.clone()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_placeholder_shape() {
        let result = AnalysisResult::degraded();
        assert_eq!(result.tags, vec!["analysis_failed".to_string()]);
        assert_eq!(result.resolution_status, ResolutionStatus::Unresolved);
        assert_eq!(result.sentiment, Some(5));
        assert_eq!(result.call_type.as_deref(), Some("unknown"));
        assert!(result.degraded);
    }

    #[test]
    fn test_resolution_status_exact_parse() {
        for status in ResolutionStatus::ALL {
            assert_eq!(status.as_str().parse::<ResolutionStatus>().unwrap(), status);
        }
        assert!("Resolved".parse::<ResolutionStatus>().is_err());
    }

    #[test]
    fn test_tag_serializations_agree() {
        let mut result = AnalysisResult::degraded();
        result.tags = vec!["billing".into(), "refund".into()];
        assert_eq!(result.tags_joined(), "billing,refund");
        assert_eq!(result.tags_json(), r#"["billing","refund"]"#);
    }
}
