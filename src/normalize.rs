use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

/// Timestamps without an explicit offset are wall-clock time at the venue.
pub const UPSTREAM_TZ: Tz = chrono_tz::Africa::Cairo;

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+(?:\.[0-9]+)?").expect("valid number regex"));
static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("valid digits regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static DAY_MONTH_YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9]{1,2})[\s\-/.,]+(\p{L}+)[\s\-/.,]+([0-9]{4})")
        .expect("valid day-month-year regex")
});

/// Month names in lookup order. The first key contained in the text wins,
/// regardless of where in the text it occurs.
const MONTHS: &[(&str, u32)] = &[
    ("january", 1),
    ("jan", 1),
    ("يناير", 1),
    ("february", 2),
    ("feb", 2),
    ("فبراير", 2),
    ("march", 3),
    ("mar", 3),
    ("مارس", 3),
    ("april", 4),
    ("apr", 4),
    ("أبريل", 4),
    ("may", 5),
    ("مايو", 5),
    ("june", 6),
    ("jun", 6),
    ("يونيو", 6),
    ("july", 7),
    ("jul", 7),
    ("يوليو", 7),
    ("august", 8),
    ("aug", 8),
    ("أغسطس", 8),
    ("september", 9),
    ("sep", 9),
    ("سبتمبر", 9),
    ("october", 10),
    ("oct", 10),
    ("أكتوبر", 10),
    ("november", 11),
    ("nov", 11),
    ("نوفمبر", 11),
    ("december", 12),
    ("dec", 12),
    ("ديسمبر", 12),
];

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%z"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d %B %Y %H:%M",
    "%d %B %Y %I:%M %p",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%A %d %B %Y",
    "%A, %d %B %Y",
    "%a %d %b %Y",
    "%A, %B %d, %Y",
    "%d/%m/%Y",
];

/// Smallest useful reading of a price: the first number after dropping
/// thousands separators.
pub fn parse_price(text: &str) -> Option<f64> {
    let stripped = ascii_digits(text).replace([',', '٬'], "");
    NUMBER_RE
        .find(&stripped)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Removes `<...>` sequences. Entities are left as they are.
pub fn strip_html(text: &str) -> String {
    TAG_RE.replace_all(text, "").into_owned()
}

/// Free-form date text to an RFC 3339 timestamp in the upstream timezone.
///
/// Returns `None` only when the text carries no digits at all. Text that has
/// digits but cannot be read as a date yields the current time, so callers
/// always get a usable timestamp.
pub fn parse_date(text: &str) -> Option<String> {
    if !DIGITS_RE.is_match(&ascii_digits(text)) {
        return None;
    }
    let parsed = parse_date_opt(text).unwrap_or_else(now_upstream);
    Some(parsed.to_rfc3339())
}

/// Like [`parse_date`], without the current-time fallback.
pub fn parse_date_opt(text: &str) -> Option<DateTime<Tz>> {
    let cleaned = ascii_digits(text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if cleaned.is_empty() {
        return None;
    }
    let normalized = DAY_MONTH_YEAR_RE.replace_all(&cleaned, "$1 $2 $3");
    parse_calendar(&normalized).or_else(|| parse_month_name(&normalized))
}

/// Arabic-Indic and Eastern Arabic-Indic digits folded to ASCII.
fn ascii_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            _ => c,
        })
        .collect()
}

pub fn now_upstream() -> DateTime<Tz> {
    Utc::now().with_timezone(&UPSTREAM_TZ)
}

/// Reads back a timestamp produced by [`parse_date`].
pub fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_calendar(text: &str) -> Option<DateTime<Tz>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&UPSTREAM_TZ));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Some(dt.with_timezone(&UPSTREAM_TZ));
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return localize(naive);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return localize(date.and_hms_opt(0, 0, 0)?);
        }
    }
    None
}

/// Day is the first number, year the last four-digit number (else the last
/// number), month the first table key found in the text.
fn parse_month_name(text: &str) -> Option<DateTime<Tz>> {
    let lower = text.to_lowercase();
    let numbers: Vec<&str> = DIGITS_RE.find_iter(&lower).map(|m| m.as_str()).collect();
    if numbers.len() < 2 {
        return None;
    }

    let day: u32 = numbers[0].parse().ok()?;
    let year_token = numbers
        .iter()
        .rev()
        .find(|token| token.chars().count() == 4)
        .or_else(|| numbers.last())?;
    let mut year: i32 = year_token.parse().ok()?;
    if year < 100 {
        year += 2000;
    }
    let month = MONTHS
        .iter()
        .find(|(key, _)| lower.contains(key))
        .map(|(_, month)| *month)
        .unwrap_or(1);

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    localize(date.and_hms_opt(0, 0, 0)?)
}

fn localize(naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match UPSTREAM_TZ.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(dt, _) => Some(dt),
        // Cairo springs forward at midnight; the skipped hour maps to the next one.
        LocalResult::None => UPSTREAM_TZ
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn parsed(text: &str) -> DateTime<chrono::FixedOffset> {
        let iso = parse_date(text).expect("date text has digits");
        DateTime::parse_from_rfc3339(&iso).expect("parse_date emits rfc3339")
    }

    #[test]
    fn price_ignores_thousands_separators() {
        assert_eq!(parse_price("1,200 EGP"), Some(1200.0));
        assert_eq!(parse_price("EGP 350.50"), Some(350.5));
        assert_eq!(parse_price("From 200 - 800 EGP"), Some(200.0));
    }

    #[test]
    fn price_without_digits_is_none() {
        assert_eq!(parse_price("no digits"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn strips_tags_but_not_entities() {
        assert_eq!(
            strip_html("<p>Omar <b>Khairat</b> &amp; friends</p>"),
            "Omar Khairat &amp; friends"
        );
    }

    #[test]
    fn dashed_day_month_year() {
        let dt = parsed("19-February-2026");
        assert_eq!((dt.year(), dt.month(), dt.day()), (2026, 2, 19));
    }

    #[test]
    fn arabic_month_name() {
        let dt = parsed("19 فبراير 2026");
        assert_eq!((dt.year(), dt.month(), dt.day()), (2026, 2, 19));
    }

    #[test]
    fn arabic_indic_day_is_not_taken_for_the_year() {
        let dt = parse_date_opt("١٩ فبراير 2026").expect("readable date");
        assert_eq!((dt.year(), dt.month(), dt.day()), (2026, 2, 19));
        let dt = parsed("١٩ فبراير ٢٠٢٦");
        assert_eq!((dt.year(), dt.month(), dt.day()), (2026, 2, 19));
    }

    #[test]
    fn arabic_indic_price() {
        assert_eq!(parse_price("٤٥٠ جنيه"), Some(450.0));
    }

    #[test]
    fn iso_without_offset_is_cairo_wall_clock() {
        let dt = parsed("2026-03-01T20:30:00");
        assert_eq!((dt.month(), dt.day(), dt.hour(), dt.minute()), (3, 1, 20, 30));
        assert_eq!(dt.offset().local_minus_utc(), 2 * 3600);
    }

    #[test]
    fn explicit_offset_keeps_the_instant() {
        let dt = parsed("2026-03-01T18:00:00Z");
        assert_eq!(dt.with_timezone(&Utc).hour(), 18);
    }

    #[test]
    fn month_lookup_uses_table_order() {
        // "may" appears first in the text, but "jan" comes first in the table.
        let dt = parsed("5 may jan 2026");
        assert_eq!((dt.year(), dt.month(), dt.day()), (2026, 1, 5));
    }

    #[test]
    fn heuristic_handles_trailing_time() {
        let dt = parsed("Thu 19 Feb 2026 - 8:00 PM");
        assert_eq!((dt.year(), dt.month(), dt.day()), (2026, 2, 19));
    }

    #[test]
    fn no_digits_is_none() {
        assert_eq!(parse_date("coming soon"), None);
        assert_eq!(parse_date(""), None);
        assert!(parse_date_opt("coming soon").is_none());
    }

    #[test]
    fn unreadable_digits_fall_back_to_now() {
        let before = Utc::now() - Duration::seconds(1);
        let dt = parsed("Doors 7").with_timezone(&Utc);
        assert!(dt >= before && dt <= Utc::now() + Duration::seconds(1));
        assert!(parse_date_opt("Doors 7").is_none());
    }

    #[test]
    fn parse_instant_reads_back_output() {
        let iso = parse_date("2026-02-19").expect("iso date");
        let instant = parse_instant(&iso).expect("instant");
        assert_eq!(instant.to_rfc3339(), "2026-02-18T22:00:00+00:00");
    }
}
