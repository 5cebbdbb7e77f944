use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::base::{self, CardFields};
use super::{Payload, PayloadKind, SourceAdapter};
use crate::models::{AdapterId, RawCandidate};

static ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>").expect("valid anchor regex"));
static HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid href regex")
});
/// `/e/812`, `#/event/omar-khairat-2026`, `/events/812/details`; the id
/// segment must carry a digit so listing routes like `/events/category` are skipped.
static EVENT_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|/)(?:e|event|events|event-details)/[a-z0-9_\-]*\d[a-z0-9_\-]*(?:[/?#]|$)")
        .expect("valid event path regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static HIDDEN_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(?:script|style)\s*>").expect("valid block regex")
});

/// Bytes of markup read on each side of an event link.
pub const TEXT_WINDOW: usize = 600;

struct EventLink {
    start: usize,
    end: usize,
    href: String,
    text: String,
}

/// Last resort for markup with no usable structure: event links found by
/// their path, with nearby text read through the card line classifiers.
pub struct LinkFallback {
    site_url: String,
    window: usize,
}

impl LinkFallback {
    pub fn new(site_url: &str) -> Self {
        Self::with_window(site_url, TEXT_WINDOW)
    }

    pub fn with_window(site_url: &str, window: usize) -> Self {
        Self {
            site_url: site_url.to_string(),
            window,
        }
    }

    fn event_links(&self, html: &str) -> Vec<EventLink> {
        ANCHOR_RE
            .captures_iter(html)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let attrs = caps.get(1)?.as_str();
                let href = HREF_RE
                    .captures(attrs)
                    .and_then(|h| h.get(1).or_else(|| h.get(2)))
                    .map(|m| decode_entities(m.as_str()))?;
                if !EVENT_PATH_RE.is_match(href.trim()) {
                    return None;
                }
                let inner = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
                Some(EventLink {
                    start: whole.start(),
                    end: whole.end(),
                    href,
                    text: base::clean_text(&decode_entities(&TAG_RE.replace_all(inner, " "))),
                })
            })
            .collect()
    }

    /// Text around link `idx`, nearest lines first, never reaching into a
    /// neighbouring event link.
    fn context_lines(&self, html: &str, links: &[EventLink], idx: usize) -> Vec<String> {
        let link = &links[idx];
        let lower = idx
            .checked_sub(1)
            .map(|prev| links[prev].end)
            .unwrap_or(0)
            .max(link.start.saturating_sub(self.window));
        let upper = links
            .get(idx + 1)
            .map(|next| next.start)
            .unwrap_or(html.len())
            .min(link.end + self.window);

        let before = markup_lines(&html[char_floor(html, lower)..link.start]);
        let after = markup_lines(&html[link.end..char_floor(html, upper).max(link.end)]);

        let mut lines = Vec::with_capacity(before.len() + after.len() + 1);
        if !link.text.is_empty() {
            lines.push(link.text.clone());
        }
        let mut before = before.into_iter().rev();
        let mut after = after.into_iter();
        loop {
            let (b, a) = (before.next(), after.next());
            if b.is_none() && a.is_none() {
                break;
            }
            lines.extend(b);
            lines.extend(a);
        }
        lines
    }

    fn candidate(&self, link: &EventLink, url: String, fields: CardFields) -> Option<RawCandidate> {
        let title = Some(link.text.clone())
            .filter(|text| !text.is_empty() && !base::is_boilerplate(text))
            .or(fields.title)?;

        let mut raw = RawCandidate::new(AdapterId::LinkFallback);
        raw.set("title", title);
        raw.set("url", url);
        if let Some(date) = fields.date {
            raw.set("date", date);
        }
        if let Some(price) = fields.price {
            raw.set("priceText", price);
        }
        if let Some(location) = fields.location {
            raw.set("location", location);
        }
        Some(raw)
    }
}

impl SourceAdapter for LinkFallback {
    fn adapter_id(&self) -> AdapterId {
        AdapterId::LinkFallback
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::Markup
    }

    fn extract(&self, payload: &Payload) -> Vec<RawCandidate> {
        let Payload::Markup(html) = payload else {
            return Vec::new();
        };

        let links = self.event_links(html);
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();

        for (idx, link) in links.iter().enumerate() {
            let Some(url) = base::absolute_url(&self.site_url, Some(link.href.clone())) else {
                continue;
            };
            if !seen.insert(normalized_path(&url)) {
                continue;
            }
            let fields = base::classify_lines(&self.context_lines(html, &links, idx));
            if let Some(raw) = self.candidate(link, url, fields) {
                out.push(raw);
            }
        }

        debug!(links = links.len(), kept = out.len(), "link fallback finished");
        out
    }
}

/// Lowercased path plus fragment, with queries and trailing slashes dropped.
/// Hash routes keep their fragment since it is the only distinguishing part.
fn normalized_path(url: &str) -> String {
    let lower = url.to_lowercase();
    let (path, fragment) = match reqwest::Url::parse(&lower) {
        Ok(parsed) => (
            parsed.path().to_string(),
            parsed.fragment().map(str::to_string),
        ),
        Err(_) => match lower.split_once('#') {
            Some((path, fragment)) => (path.to_string(), Some(fragment.to_string())),
            None => (lower.clone(), None),
        },
    };
    let path = path.split('?').next().unwrap_or_default().trim_end_matches('/');
    match fragment {
        Some(fragment) => {
            let fragment = fragment.split('?').next().unwrap_or_default();
            format!("{path}#{}", fragment.trim_end_matches('/'))
        }
        None => path.to_string(),
    }
}

fn markup_lines(fragment: &str) -> Vec<String> {
    let fragment = HIDDEN_BLOCK_RE.replace_all(trim_partial_tags(fragment), "\n");
    TAG_RE
        .replace_all(&fragment, "\n")
        .lines()
        .map(|line| base::clean_text(&decode_entities(line)))
        .filter(|line| !line.is_empty())
        .collect()
}

fn char_floor(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Drops a tag cut in half at either edge of a window.
fn trim_partial_tags(window: &str) -> &str {
    let mut slice = window;
    if let Some(close) = slice.find('>') {
        if slice.find('<').map_or(true, |open| close < open) {
            slice = &slice[close + 1..];
        }
    }
    if let Some(open) = slice.rfind('<') {
        if slice.rfind('>').map_or(true, |close| close < open) {
            slice = &slice[..open];
        }
    }
    slice
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
