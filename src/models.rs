use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub start_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    pub time: Option<String>,
    pub image_url: Option<String>,
    pub event_url: String,
    pub category: String,
    pub price: Option<f64>,
    pub is_bookmarked: bool,
}

/// Which extraction strategy produced a candidate.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AdapterId {
    StructuredFeed,
    EmbeddedJson,
    DomHeuristic,
    LinkFallback,
}

impl AdapterId {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterId::StructuredFeed => "structured_feed",
            AdapterId::EmbeddedJson => "embedded_json",
            AdapterId::DomHeuristic => "dom_heuristic",
            AdapterId::LinkFallback => "link_fallback",
        }
    }
}

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loosely-typed event record as an adapter found it. Field names vary by
/// adapter; the canonicalizer resolves them by precedence.
#[derive(Clone, Debug, PartialEq)]
pub struct RawCandidate {
    pub adapter: AdapterId,
    pub fields: Map<String, Value>,
}

impl RawCandidate {
    pub fn new(adapter: AdapterId) -> Self {
        Self {
            adapter,
            fields: Map::new(),
        }
    }

    pub fn from_object(adapter: AdapterId, fields: Map<String, Value>) -> Self {
        Self { adapter, fields }
    }

    /// Sets `key` unless the value is null or a blank string.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let blank = match &value {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            _ => false,
        };
        if !blank {
            self.fields.insert(key.to_string(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// First key, in the given order, holding a non-empty scalar rendered as text.
    pub fn first_text(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|key| self.fields.get(*key))
            .find_map(value_text)
    }
}

/// Renders strings and numbers as trimmed text. Objects yield their `name`
/// (then `location`) member, which is how venues arrive nested.
pub fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Object(map) => {
            return ["name", "location", "title"]
                .iter()
                .filter_map(|key| map.get(*key))
                .find_map(value_text)
        }
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EventsResponse {
    pub success: bool,
    pub cached: bool,
    pub count: usize,
    pub events: Vec<CanonicalEvent>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventsResponse {
    pub fn ok(events: Vec<CanonicalEvent>, cached: bool) -> Self {
        let message = if cached {
            "Events from cache"
        } else {
            "Events fetched from tazkarti.com"
        };
        Self {
            success: true,
            cached,
            count: events.len(),
            events,
            message: message.to_string(),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            cached: false,
            count: 0,
            events: Vec::new(),
            message: message.into(),
            error: Some("Failed to fetch events".to_string()),
        }
    }
}
