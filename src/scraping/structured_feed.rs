use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use super::{Payload, PayloadKind, SourceAdapter};
use crate::config::AppConfig;
use crate::models::{value_text, AdapterId, RawCandidate};
use crate::normalize;

/// Typed upstream feed: one category, upcoming records only.
pub struct StructuredFeed {
    category_id: i64,
    image_base_url: String,
    event_base_url: String,
}

impl StructuredFeed {
    pub fn new(category_id: i64, image_base_url: &str, event_base_url: &str) -> Self {
        Self {
            category_id,
            image_base_url: image_base_url.to_string(),
            event_base_url: event_base_url.to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.category_id,
            &config.image_base_url,
            &config.event_base_url,
        )
    }

    fn in_category(&self, record: &Value) -> bool {
        match record.get("eventCategoryId") {
            Some(Value::Number(n)) => n.as_i64() == Some(self.category_id),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok() == Some(self.category_id),
            _ => false,
        }
    }

    fn map_record(&self, record: &Value) -> Option<RawCandidate> {
        let record = record.as_object()?;
        let mut raw = RawCandidate::new(AdapterId::StructuredFeed);

        let id = record.get("id").and_then(value_text);
        if let Some(ref id) = id {
            raw.set("id", id.as_str());
            raw.set("url", format!("{}{}", self.event_base_url, id));
        }
        raw.set("name", record.get("name").cloned().unwrap_or(Value::Null));
        raw.set(
            "summary",
            record.get("summary").cloned().unwrap_or(Value::Null),
        );
        if let Some(venue) = record.get("venue").and_then(value_text) {
            raw.set("venue", venue);
        }
        raw.set(
            "startDate",
            record.get("startDate").cloned().unwrap_or(Value::Null),
        );
        raw.set(
            "endDate",
            record.get("endDate").cloned().unwrap_or(Value::Null),
        );

        let first_show = record
            .get("shows")
            .and_then(Value::as_array)
            .and_then(|shows| shows.first());
        if let Some(show_start) = first_show.and_then(|show| show.get("startDate")) {
            raw.set("time", show_start.clone());
        }

        if let Some(photo) = record.get("eventPhoto").and_then(value_text) {
            raw.set("image", format!("{}{}", self.image_base_url, photo));
        }

        let price = ["minimumPrice", "eventPrice"]
            .iter()
            .filter_map(|key| record.get(*key))
            .find(|value| !value.is_null())
            .cloned();
        if let Some(price) = price {
            raw.set("price", price);
        }

        Some(raw)
    }
}

impl SourceAdapter for StructuredFeed {
    fn adapter_id(&self) -> AdapterId {
        AdapterId::StructuredFeed
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::Feed
    }

    fn extract(&self, payload: &Payload) -> Vec<RawCandidate> {
        let Payload::Feed(records) = payload else {
            return Vec::new();
        };
        let now = Utc::now();

        let candidates: Vec<RawCandidate> = records
            .iter()
            .filter(|record| self.in_category(record))
            .filter(|record| {
                let ended = record
                    .get("endDate")
                    .and_then(Value::as_str)
                    .and_then(normalize::parse_date_opt)
                    .is_some_and(|end| end < now);
                !ended
            })
            .filter_map(|record| self.map_record(record))
            .collect();

        debug!(
            records = records.len(),
            kept = candidates.len(),
            "structured feed filtered"
        );
        candidates
    }
}
