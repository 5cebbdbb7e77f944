use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::canonical::{resolve_raw_date, resolve_title};
use crate::models::{CanonicalEvent, RawCandidate};
use crate::normalize;

/// Drops candidates whose lowercased title and raw date text repeat an
/// earlier one. Runs before any date parsing, so two undated listings are
/// only merged when their titles match as well.
pub fn dedup_raw(candidates: Vec<RawCandidate>) -> Vec<RawCandidate> {
    let before = candidates.len();
    let mut seen: HashSet<String> = HashSet::new();
    let kept: Vec<RawCandidate> = candidates
        .into_iter()
        .filter(|raw| {
            let title = resolve_title(raw).unwrap_or_default().to_lowercase();
            let date = resolve_raw_date(raw).unwrap_or_default();
            seen.insert(format!("{title}|{date}"))
        })
        .collect();
    if kept.len() < before {
        debug!(dropped = before - kept.len(), "removed duplicate candidates");
    }
    kept
}

/// Keeps events whose end date, or start date when there is none, is
/// strictly after `now`. Unreadable timestamps count as not upcoming.
pub fn retain_upcoming(events: Vec<CanonicalEvent>, now: DateTime<Utc>) -> Vec<CanonicalEvent> {
    events
        .into_iter()
        .filter(|event| {
            let reference = event.end_date.as_deref().unwrap_or(&event.start_date);
            normalize::parse_instant(reference).is_some_and(|at| at > now)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AdapterId;
    use chrono::Duration;

    fn candidate(title: &str, date: Option<&str>, url: &str) -> RawCandidate {
        let mut raw = RawCandidate::new(AdapterId::DomHeuristic);
        raw.set("title", title);
        if let Some(date) = date {
            raw.set("date", date);
        }
        raw.set("url", url);
        raw
    }

    fn event(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> CanonicalEvent {
        CanonicalEvent {
            id: "e".into(),
            title: "Event".into(),
            description: String::new(),
            location: String::new(),
            start_date: start.to_rfc3339(),
            end_date: end.map(|end| end.to_rfc3339()),
            time: None,
            image_url: None,
            event_url: "https://www.tazkarti.com/#/events/category/3".into(),
            category: "Music".into(),
            price: None,
            is_bookmarked: false,
        }
    }

    #[test]
    fn first_duplicate_wins() {
        let kept = dedup_raw(vec![
            candidate("Cairokee", Some("Fri 6 Mar 2026"), "first"),
            candidate("CAIROKEE", Some("Fri 6 Mar 2026"), "second"),
            candidate("Cairokee", Some("Sat 7 Mar 2026"), "third"),
        ]);
        let urls: Vec<String> = kept
            .iter()
            .filter_map(|raw| raw.first_text(&["url"]))
            .collect();
        assert_eq!(urls, vec!["first".to_string(), "third".to_string()]);
    }

    #[test]
    fn title_and_date_do_not_run_together() {
        let kept = dedup_raw(vec![
            candidate("Night", Some("12 Mar 2026"), "a"),
            candidate("Night1", Some("2 Mar 2026"), "b"),
        ]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn undated_candidates_with_different_titles_survive() {
        let kept = dedup_raw(vec![
            candidate("Wust El Balad", None, "a"),
            candidate("Massar Egbari", None, "b"),
        ]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn start_just_past_is_excluded() {
        let now = Utc::now();
        let kept = retain_upcoming(vec![event(now - Duration::seconds(1), None)], now);
        assert!(kept.is_empty());
    }

    #[test]
    fn future_end_overrides_past_start() {
        let now = Utc::now();
        let kept = retain_upcoming(
            vec![event(
                now - Duration::days(3),
                Some(now + Duration::seconds(1)),
            )],
            now,
        );
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn past_end_excludes_future_start() {
        let now = Utc::now();
        let kept = retain_upcoming(
            vec![event(now + Duration::days(1), Some(now - Duration::hours(1)))],
            now,
        );
        assert!(kept.is_empty());
    }
}
