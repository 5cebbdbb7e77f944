// HTTP-level tests for the events router, driven in-process through
// tower::ServiceExt::oneshot against a scripted upstream.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt as _;

use tazkarti_events_lib::config::AppConfig;
use tazkarti_events_lib::fetch::{FetchError, PageFetcher};
use tazkarti_events_lib::scraping::{Payload, PayloadKind};
use tazkarti_events_lib::service::EventService;
use tazkarti_events_lib::{app, AppState};

const BODY_LIMIT: usize = 1024 * 1024;

/// Scripted upstream: a fixed feed and page, or failure for both.
struct MockUpstream {
    feed: Vec<Value>,
    markup: String,
    down: bool,
    calls: AtomicUsize,
}

impl MockUpstream {
    fn feed(records: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            feed: records,
            markup: String::new(),
            down: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn page(markup: &str) -> Arc<Self> {
        Arc::new(Self {
            feed: Vec::new(),
            markup: markup.to_string(),
            down: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn down() -> Arc<Self> {
        Arc::new(Self {
            feed: Vec::new(),
            markup: String::new(),
            down: true,
            calls: AtomicUsize::new(0),
        })
    }
}

impl PageFetcher for MockUpstream {
    fn fetch(&self, kind: PayloadKind) -> Result<Payload, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down {
            return Err(FetchError::Http("connection refused".to_string()));
        }
        Ok(match kind {
            PayloadKind::Feed => Payload::Feed(self.feed.clone()),
            PayloadKind::Markup => Payload::Markup(self.markup.clone()),
        })
    }
}

fn router_with(config: AppConfig, upstream: Arc<MockUpstream>) -> Router {
    app(AppState::new(EventService::new(config, upstream)))
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.clone().oneshot(req).await.expect("router response");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json = serde_json::from_slice(&bytes).expect("json body");
    (status, json)
}

fn iso(offset: Duration) -> String {
    (Utc::now() + offset).to_rfc3339()
}

fn music_feed() -> Vec<Value> {
    vec![
        json!({
            "id": 901,
            "eventCategoryId": 3,
            "name": "Summer Gala",
            "summary": "<p>Last season</p>",
            "venue": { "name": "Main Hall" },
            "startDate": iso(-Duration::days(40)),
            "endDate": iso(-Duration::days(39)),
            "eventPhoto": "gala.jpg",
            "minimumPrice": 300
        }),
        json!({
            "id": 902,
            "eventCategoryId": 3,
            "name": "Omar Khairat",
            "summary": "<p>An evening of <b>film scores</b></p>",
            "venue": { "location": "Cairo Opera House" },
            "startDate": iso(Duration::days(10)),
            "endDate": iso(Duration::days(10) + Duration::hours(3)),
            "shows": [{ "id": 1, "startDate": "2026-11-20T20:00:00" }],
            "eventPhoto": "omar.jpg",
            "minimumPrice": null,
            "eventPrice": "450"
        }),
        json!({
            "id": 903,
            "eventCategoryId": 1,
            "name": "Al Ahly vs Zamalek",
            "startDate": iso(Duration::days(5))
        }),
    ]
}

#[tokio::test]
async fn index_describes_the_api() {
    let app = router_with(AppConfig::default(), MockUpstream::feed(Vec::new()));
    for uri in ["/", "/api"] {
        let (status, body) = get_json(&app, uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["eventsEndpoint"], "/api/events/music");
        assert_eq!(body["name"], "Tazkarti Events API");
    }
}

#[tokio::test]
async fn feed_yields_only_the_upcoming_music_event() {
    let upstream = MockUpstream::feed(music_feed());
    let app = router_with(AppConfig::default(), upstream.clone());

    let (status, body) = get_json(&app, "/api/events/music").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["cached"], false);
    assert_eq!(body["count"], 1);
    assert_eq!(body["message"], "Events fetched from tazkarti.com");

    let event = &body["events"][0];
    assert_eq!(event["id"], "902");
    assert_eq!(event["title"], "Omar Khairat");
    assert_eq!(event["category"], "Music");
    assert_eq!(event["description"], "An evening of film scores");
    assert_eq!(event["location"], "Cairo Opera House");
    assert_eq!(event["time"], "2026-11-20T20:00:00");
    assert_eq!(
        event["imageUrl"],
        "https://www.tazkarti.com/bookenter/Entertainment/events/omar.jpg"
    );
    assert_eq!(event["eventUrl"], "https://www.tazkarti.com/#/e/902");
    assert_eq!(event["price"], 450.0);
    assert_eq!(event["isBookmarked"], false);
    assert!(event["endDate"].is_string());

    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1, "page not needed");
}

#[tokio::test]
async fn second_request_is_served_from_cache() {
    let upstream = MockUpstream::feed(music_feed());
    let app = router_with(AppConfig::default(), upstream.clone());

    let (_, first) = get_json(&app, "/api/events").await;
    let (status, second) = get_json(&app, "/api/events/music").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["cached"], true);
    assert_eq!(second["message"], "Events from cache");
    assert_eq!(second["events"], first["events"]);
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn upstream_failure_still_answers_200() {
    let app = router_with(AppConfig::default(), MockUpstream::down());

    let (status, body) = get_json(&app, "/api/events/music").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Failed to fetch events");
    assert_eq!(body["count"], 0);
    assert_eq!(body["events"], json!([]));
    assert!(body["message"]
        .as_str()
        .is_some_and(|m| m.contains("connection refused")));
}

#[tokio::test]
async fn empty_upstream_is_a_successful_empty_list() {
    let app = router_with(
        AppConfig::default(),
        MockUpstream::page("<html><body><p>No events right now</p></body></html>"),
    );
    let (status, body) = get_json(&app, "/api/events/music").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 0);
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn page_cards_are_used_when_the_feed_is_empty() {
    let page = r#"
    <html><body><main><section class="events">
      <article>
        <h3>Cairokee</h3>
        <p>Fri 4 Dec 2099</p>
        <p>Cairo Festival City Arena, New Cairo</p>
        <p>Tickets from 600 EGP</p>
        <a href="/#/e/4001">Buy Tickets</a>
      </article>
      <article>
        <h3>Wust El Balad</h3>
        <p>Sat 5 Dec 2099</p>
        <p>El Sawy Culture Wheel, Zamalek</p>
        <p>Tickets from 350 EGP</p>
        <a href="/#/e/4002">Buy Tickets</a>
      </article>
    </section></main></body></html>
    "#;
    let config = AppConfig {
        default_location: Some("Cairo".to_string()),
        ..AppConfig::default()
    };
    let app = router_with(config, MockUpstream::page(page));

    let (_, body) = get_json(&app, "/api/events/music").await;
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 2);

    let titles: Vec<&str> = body["events"]
        .as_array()
        .expect("events array")
        .iter()
        .filter_map(|e| e["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["Cairokee", "Wust El Balad"]);
    assert_eq!(body["events"][0]["price"], 600.0);
    assert_eq!(
        body["events"][0]["location"],
        "Cairo Festival City Arena, New Cairo"
    );
    assert_eq!(body["events"][1]["eventUrl"], "https://www.tazkarti.com/#/e/4002");
}

#[tokio::test]
async fn cors_preflight_is_answered() {
    let app = router_with(AppConfig::default(), MockUpstream::feed(Vec::new()));
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/api/events/music")
        .header("origin", "https://example.org")
        .header("access-control-request-method", "GET")
        .body(Body::empty())
        .expect("build preflight");
    let resp = app.oneshot(req).await.expect("preflight response");
    assert!(resp.status().is_success());
    assert!(resp
        .headers()
        .contains_key("access-control-allow-origin"));
}
