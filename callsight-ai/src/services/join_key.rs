//! Recording reference derivation from document titles
//!
//! Documents ingested without an indexed recording reference usually carry it
//! in the title (`"Call rec-20240311-0042.wav"`, a UUID, or a long digit run
//! from the telephony export). The selector holds the derivation as a plain
//! function pointer so callers can substitute their own convention.

use once_cell::sync::Lazy;
use regex::Regex;

/// Pure title → recording reference function
pub type JoinKeyDeriver = fn(&str) -> Option<String>;

static UUID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
        .expect("uuid pattern is valid")
});

static PREFIXED_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:rec|recording|call)[-_ #:]*([0-9][0-9-]*[0-9]|[0-9])\b").expect("prefixed pattern is valid")
});

static DIGIT_RUN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{8,}").expect("digit run pattern is valid"));

/// Default derivation: UUID, then `rec`/`recording`/`call` + number, then
/// the first run of 8+ digits
pub fn derive_recording_ref(title: &str) -> Option<String> {
    if let Some(m) = UUID_PATTERN.find(title) {
        return Some(m.as_str().to_ascii_lowercase());
    }
    if let Some(caps) = PREFIXED_PATTERN.captures(title) {
        if let Some(m) = caps.get(1) {
            return Some(m.as_str().to_string());
        }
    }
    DIGIT_RUN_PATTERN.find(title).map(|m| m.as_str().to_string())
}

/// Derivation that never finds a key
pub fn no_join_key(_title: &str) -> Option<String> {
    None
}
