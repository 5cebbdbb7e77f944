use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Node, Selector};

const MONTH_ALTERNATION: &str = "jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?|يناير|فبراير|مارس|أبريل|ابريل|مايو|يونيو|يوليو|أغسطس|اغسطس|سبتمبر|أكتوبر|اكتوبر|نوفمبر|ديسمبر";

pub static PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:\d[\d,٬]*(?:\.\d+)?\s*(?:egp\b|l\.e\.?|le\b|جنيه|ج\.م)|\b(?:egp|le|l\.e\.?)\s*\d|\bprices?\s*(?:from)?\s*:?\s*\d)",
    )
    .expect("valid price regex")
});

pub static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!(
        r"(?i)(?:\b\d{{1,2}}(?:st|nd|rd|th)?[\s\-/.,]*(?:{m})\b|\b(?:{m})[\s\-/.,]*\d{{1,2}}\b|\b\d{{1,2}}[/-]\d{{1,2}}[/-]\d{{2,4}}\b|\b\d{{4}}-\d{{2}}-\d{{2}}\b)",
        m = MONTH_ALTERNATION
    );
    Regex::new(&pattern).expect("valid date regex")
});

pub static CTA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bbuy\s+tickets?\b|\bbook\s+now\b|احجز|شراء\s+التذاكر|اشتري\s+التذاكر")
        .expect("valid call-to-action regex")
});

static VENUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:opera\s+house|opera|theat(?:er|re)|amphitheat(?:er|re)|hall|arena|stadium|sawy|culture\s+wheel|venue)\b|مسرح|قاعة|الأوبرا|ساقية",
    )
    .expect("valid venue regex")
});

pub static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("anchor selector"));
pub static IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img[src]").expect("image selector"));

const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

const BOILERPLATE: &[&str] = &[
    "buy tickets",
    "buy ticket",
    "book now",
    "search",
    "more info",
    "more details",
    "details",
    "sold out",
    "view all",
    "events",
    "home",
    "login",
    "sign in",
    "احجز",
    "احجز الآن",
    "بحث",
    "شراء التذاكر",
    "المزيد",
];

/// Dates shorter than this are treated as a date line, never a title.
const SHORT_DATE_LINE: usize = 40;

pub fn clean_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Visible text nodes of `element`, one cleaned line each.
pub fn text_lines(element: ElementRef<'_>) -> Vec<String> {
    let mut lines = Vec::new();
    collect_lines(element, &mut lines);
    lines
}

fn collect_lines(element: ElementRef<'_>, out: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let cleaned = clean_text(text);
                if !cleaned.is_empty() {
                    out.push(cleaned);
                }
            }
            Node::Element(el) if HIDDEN_TAGS.contains(&el.name()) => {}
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_lines(child_el, out);
                }
            }
            _ => {}
        }
    }
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    text_lines(element).join(" ")
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(href).ok().map(|u| u.to_string())
}

/// Price, date and call-to-action all present.
pub fn has_event_signals(text: &str) -> bool {
    PRICE_RE.is_match(text) && DATE_RE.is_match(text) && CTA_RE.is_match(text)
}

pub fn is_boilerplate(line: &str) -> bool {
    let lower = line.trim().to_lowercase();
    BOILERPLATE.iter().any(|phrase| *phrase == lower)
        || CTA_RE
            .find(&lower)
            .is_some_and(|m| m.as_str().len() == lower.len())
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CardFields {
    pub title: Option<String>,
    pub date: Option<String>,
    pub price: Option<String>,
    pub location: Option<String>,
}

/// Line-level classification of one card's text.
pub fn classify_lines(lines: &[String]) -> CardFields {
    let price_idx = lines.iter().position(|line| PRICE_RE.is_match(line));
    let date_idx = lines
        .iter()
        .enumerate()
        .position(|(idx, line)| Some(idx) != price_idx && DATE_RE.is_match(line));
    let location = lines
        .iter()
        .enumerate()
        .find(|(idx, line)| {
            Some(*idx) != price_idx && Some(*idx) != date_idx && VENUE_RE.is_match(line)
        })
        .map(|(_, line)| line.clone());

    let title = lines
        .iter()
        .find(|line| {
            !is_boilerplate(line)
                && !(DATE_RE.is_match(line) && line.chars().count() < SHORT_DATE_LINE)
                && !PRICE_RE.is_match(line)
        })
        .or_else(|| lines.first())
        .cloned();

    CardFields {
        title,
        date: date_idx.map(|idx| lines[idx].clone()),
        price: price_idx.map(|idx| lines[idx].clone()),
        location,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn signals_need_all_three_tokens() {
        assert!(has_event_signals("Omar Khairat 19 February 2026 From 300 EGP Buy Tickets"));
        assert!(!has_event_signals("Omar Khairat 19 February 2026 Buy Tickets"));
        assert!(!has_event_signals("19 February 2026 300 EGP"));
        assert!(has_event_signals("حفل 19 فبراير 2026 300 جنيه احجز"));
    }

    #[test]
    fn classifies_card_lines() {
        let fields = classify_lines(&lines(&[
            "Buy Tickets",
            "Cairo Symphony Orchestra",
            "Thu 19 Feb 2026",
            "Main Hall, Cairo Opera House",
            "From 1,200 EGP",
        ]));
        assert_eq!(fields.title.as_deref(), Some("Cairo Symphony Orchestra"));
        assert_eq!(fields.date.as_deref(), Some("Thu 19 Feb 2026"));
        assert_eq!(fields.location.as_deref(), Some("Main Hall, Cairo Opera House"));
        assert_eq!(fields.price.as_deref(), Some("From 1,200 EGP"));
    }

    #[test]
    fn title_falls_back_to_first_line() {
        let fields = classify_lines(&lines(&["Buy Tickets", "19 Feb 2026"]));
        assert_eq!(fields.title.as_deref(), Some("Buy Tickets"));
    }

    #[test]
    fn text_lines_skip_scripts() {
        let html = Html::parse_fragment(
            "<div><h3>Title</h3><script>var x = 1;</script><p> 19  Feb </p></div>",
        );
        let selector = Selector::parse("div").expect("div selector");
        let div = html.select(&selector).next().expect("div");
        assert_eq!(text_lines(div), vec!["Title".to_string(), "19 Feb".to_string()]);
    }

    #[test]
    fn absolute_url_joins_relative_paths() {
        assert_eq!(
            absolute_url("https://www.tazkarti.com/", Some("/events/12".into())).as_deref(),
            Some("https://www.tazkarti.com/events/12")
        );
        assert_eq!(absolute_url("https://www.tazkarti.com/", Some("javascript:void(0)".into())), None);
    }
}
