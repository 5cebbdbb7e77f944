use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::{Payload, PayloadKind, SourceAdapter};
use crate::models::{AdapterId, RawCandidate};

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>(.*?)</script>").expect("valid script regex"));
static EVENTS_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""events"\s*:\s*"#).expect("valid events key regex"));

/// Event arrays serialized into page state, e.g. `window.__STATE__ = {"events": [...]}`.
pub struct EmbeddedJson;

impl SourceAdapter for EmbeddedJson {
    fn adapter_id(&self) -> AdapterId {
        AdapterId::EmbeddedJson
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::Markup
    }

    fn extract(&self, payload: &Payload) -> Vec<RawCandidate> {
        let Payload::Markup(html) = payload else {
            return Vec::new();
        };

        for (index, caps) in SCRIPT_RE.captures_iter(html).enumerate() {
            let Some(body) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            let Some(array) = events_array(body) else {
                continue;
            };
            let entries = match serde_json::from_str::<Vec<Value>>(array) {
                Ok(entries) => entries,
                Err(err) => {
                    debug!(script = index, error = %err, "skipping malformed events array");
                    continue;
                }
            };

            let candidates: Vec<RawCandidate> = entries
                .into_iter()
                .filter_map(|entry| match entry {
                    Value::Object(fields) => {
                        Some(RawCandidate::from_object(AdapterId::EmbeddedJson, fields))
                    }
                    _ => None,
                })
                .collect();
            if !candidates.is_empty() {
                debug!(script = index, count = candidates.len(), "embedded events found");
                return candidates;
            }
        }

        Vec::new()
    }
}

/// Slice holding the array that follows the first `"events":` key, if any.
fn events_array(script: &str) -> Option<&str> {
    EVENTS_KEY_RE.find_iter(script).find_map(|key| {
        let rest = &script[key.end()..];
        if rest.starts_with('[') {
            balanced_array(rest)
        } else {
            None
        }
    })
}

/// `text` starts with `[`; returns through its matching `]`, skipping
/// brackets inside string literals.
fn balanced_array(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
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
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=idx]);
                }
            }
            _ => {}
        }
    }
    None
}
