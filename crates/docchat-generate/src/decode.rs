//! Decoding of structured values out of free-text backend replies.
//!
//! Two ordered steps: a strict JSON decode of the whole reply, then a
//! heuristic extraction (outermost `{...}` span, then `key: value` lines).

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use docchat_core::GenerationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStep {
    Strict,
    Extracted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub value: T,
    pub step: DecodeStep,
}

pub fn decode_reply<T: DeserializeOwned>(reply: &str) -> Result<Decoded<T>, GenerationError> {
    let strict = serde_json::from_str::<T>(strip_fence(reply));
    match strict {
        Ok(value) => Ok(Decoded { value, step: DecodeStep::Strict }),
        Err(strict_err) => extract(reply)
            .map(|value| Decoded { value, step: DecodeStep::Extracted })
            .ok_or_else(|| GenerationError::Parse { message: format!("reply is not decodable: {}", strict_err) }),
    }
}

fn extract<T: DeserializeOwned>(reply: &str) -> Option<T> {
    if let (Some(start), Some(end)) = (reply.find('{'), reply.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<T>(&reply[start..=end]) { return Some(v); }
        }
    }
    let fields = scan_lines(reply);
    if fields.is_empty() { return None; }
    serde_json::from_value(Value::Object(fields)).ok()
}

fn line_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\s*[-*]?\s*"?([A-Za-z_][A-Za-z0-9_ ]*?)"?\s*[:=]\s*(.+?)\s*,?\s*$"#).ok()).as_ref()
}

/// `key: value` lines; values that parse as JSON keep their type.
fn scan_lines(reply: &str) -> Map<String, Value> {
    let mut out = Map::new();
    let Some(re) = line_pattern() else { return out };
    for line in reply.lines() {
        if let Some(caps) = re.captures(line) {
            let key = caps[1].trim().to_lowercase().replace(' ', "_");
            let raw = caps[2].trim();
            let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.trim_matches('"').to_string()));
            out.insert(key, value);
        }
    }
    out
}

fn strip_fence(reply: &str) -> &str {
    let t = reply.trim();
    let t = t.strip_prefix("```json").or_else(|| t.strip_prefix("```")).unwrap_or(t);
    t.strip_suffix("```").unwrap_or(t).trim()
}
