use std::collections::HashSet;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::AppConfig;
use crate::models::{CanonicalEvent, RawCandidate};
use crate::normalize;
use crate::scraping::base;

pub const TITLE_MAX_CHARS: usize = 200;
const SLUG_MAX_CHARS: usize = 48;

const ID_KEYS: &[&str] = &["id", "eventId"];
const TITLE_KEYS: &[&str] = &["name", "title", "eventName"];
const DATE_KEYS: &[&str] = &["startDate", "date", "eventDate", "dateText"];
const END_DATE_KEYS: &[&str] = &["endDate"];
const PRICE_KEYS: &[&str] = &["price", "minimumPrice", "pricesFrom", "eventPrice", "priceText"];
const LOCATION_KEYS: &[&str] = &["location", "venue", "place", "venueName"];
const DESCRIPTION_KEYS: &[&str] = &["description", "summary"];
const IMAGE_KEYS: &[&str] = &["imageUrl", "image", "photo", "eventPhoto"];
const URL_KEYS: &[&str] = &["eventUrl", "url", "link"];
const TIME_KEYS: &[&str] = &["time", "showTime"];

/// Trimmed and truncated title, `None` when nothing usable is present.
pub fn resolve_title(raw: &RawCandidate) -> Option<String> {
    let title = raw.first_text(TITLE_KEYS)?;
    let title = base::clean_text(&title);
    if title.is_empty() {
        return None;
    }
    Some(title.chars().take(TITLE_MAX_CHARS).collect())
}

/// Date text exactly as the adapter found it.
pub fn resolve_raw_date(raw: &RawCandidate) -> Option<String> {
    raw.first_text(DATE_KEYS)
}

/// Smallest number found across every price field. Numbers, numeric text
/// and arrays of either are accepted.
pub fn resolve_price(raw: &RawCandidate) -> Option<f64> {
    PRICE_KEYS
        .iter()
        .filter_map(|key| raw.get(key))
        .flat_map(price_values)
        .filter(|price| price.is_finite())
        .reduce(f64::min)
}

fn price_values(value: &Value) -> Vec<f64> {
    match value {
        Value::Number(n) => n.as_f64().into_iter().collect(),
        Value::String(s) => normalize::parse_price(s).into_iter().collect(),
        Value::Array(items) => items.iter().flat_map(price_values).collect(),
        _ => Vec::new(),
    }
}

fn slugify(text: &str) -> String {
    let mut slug = String::new();
    for ch in text.to_lowercase().chars() {
        if ch.is_alphanumeric() {
            slug.push(ch);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug: String = slug.chars().take(SLUG_MAX_CHARS).collect();
    slug.trim_end_matches('-').to_string()
}

/// `omar-khairat-1a2b3c4d`: readable prefix plus a content hash, stable
/// across requests for the same listing.
fn content_id(title: &str, raw_date: &str, location: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"|");
    hasher.update(raw_date.as_bytes());
    hasher.update(b"|");
    hasher.update(location.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    let slug = slugify(title);
    if slug.is_empty() {
        format!("event-{}", &digest[..8])
    } else {
        format!("{slug}-{}", &digest[..8])
    }
}

/// Maps raw candidates onto the fixed output schema.
pub struct Canonicalizer {
    category: String,
    site_url: String,
    fallback_url: String,
}

impl Canonicalizer {
    pub fn new(category: &str, site_url: &str, fallback_url: &str) -> Self {
        Self {
            category: category.to_string(),
            site_url: site_url.to_string(),
            fallback_url: fallback_url.to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.category_label, &config.site_url, &config.page_url)
    }

    /// `None` only when the candidate has no title.
    pub fn canonicalize(&self, raw: &RawCandidate) -> Option<CanonicalEvent> {
        let title = resolve_title(raw)?;
        let raw_date = resolve_raw_date(raw);
        let location = raw.first_text(LOCATION_KEYS).unwrap_or_default();

        let start_date = raw_date
            .as_deref()
            .and_then(normalize::parse_date)
            .unwrap_or_else(|| normalize::now_upstream().to_rfc3339());
        let end_date = raw
            .first_text(END_DATE_KEYS)
            .as_deref()
            .and_then(normalize::parse_date_opt)
            .map(|end| end.to_rfc3339());

        let id = raw.first_text(ID_KEYS).unwrap_or_else(|| {
            content_id(&title, raw_date.as_deref().unwrap_or_default(), &location)
        });

        let description = raw
            .first_text(DESCRIPTION_KEYS)
            .map(|text| normalize::strip_html(&text).trim().to_string())
            .unwrap_or_default();

        let image_url = base::absolute_url(&self.site_url, raw.first_text(IMAGE_KEYS));
        let event_url = base::absolute_url(&self.site_url, raw.first_text(URL_KEYS))
            .unwrap_or_else(|| self.fallback_url.clone());

        Some(CanonicalEvent {
            id,
            title,
            description,
            location,
            start_date,
            end_date,
            time: raw.first_text(TIME_KEYS),
            image_url,
            event_url,
            category: self.category.clone(),
            price: resolve_price(raw),
            is_bookmarked: false,
        })
    }

    /// Canonicalizes in order and makes ids unique: a repeated id gets the
    /// event's position in the list appended.
    pub fn canonicalize_all(&self, raws: &[RawCandidate]) -> Vec<CanonicalEvent> {
        let mut used: HashSet<String> = HashSet::new();
        let mut events = Vec::with_capacity(raws.len());

        for raw in raws {
            let Some(mut event) = self.canonicalize(raw) else {
                debug!(adapter = %raw.adapter, "dropping candidate without a title");
                continue;
            };
            if used.contains(&event.id) {
                let base_id = event.id.clone();
                let mut position = events.len();
                loop {
                    let candidate = format!("{base_id}-{position}");
                    if !used.contains(&candidate) {
                        event.id = candidate;
                        break;
                    }
                    position += 1;
                }
            }
            used.insert(event.id.clone());
            events.push(event);
        }
        events
    }
}
