//! Structured-output extraction
//!
//! Models asked for JSON still wrap it in reasoning blocks, code fences or
//! prose. This strips the wrapping and deserializes the outermost object.

use delve_core::{parse_error, DelveResult};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

fn think_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"))
}

fn code_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```[A-Za-z0-9_-]*").expect("valid regex"))
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Remove reasoning blocks and fences, collapse whitespace
pub fn clean_response(raw: &str) -> String {
    let without_think = think_block().replace_all(raw, "");
    let without_fences = code_fence().replace_all(&without_think, "");
    whitespace_run()
        .replace_all(&without_fences, " ")
        .trim()
        .to_string()
}

/// Slice from the first `{` to the last `}`
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a model response into `T`
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> DelveResult<T> {
    let cleaned = clean_response(raw);
    let json = extract_json_object(&cleaned).ok_or_else(|| {
        parse_error!(
            format!("No JSON object in response ({} chars)", raw.len()),
            "structured"
        )
    })?;

    serde_json::from_str(json)
        .map_err(|e| parse_error!(format!("Response did not match schema: {}", e), "structured"))
}
