pub mod cache;
pub mod canonical;
pub mod config;
pub mod fetch;
pub mod filter;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod scraping;
pub mod service;

use std::sync::Arc;

use anyhow::Context;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use models::{CanonicalEvent, EventsResponse};
use service::EventService;

const EVENTS_ENDPOINT: &str = "/api/events/music";

#[derive(Clone)]
pub struct AppState {
    service: Arc<EventService>,
}

impl AppState {
    pub fn new(service: EventService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexData {
    name: &'static str,
    status: &'static str,
    events_endpoint: &'static str,
    message: String,
}

async fn index() -> Json<IndexData> {
    Json(IndexData {
        name: "Tazkarti Events API",
        status: "ok",
        events_endpoint: EVENTS_ENDPOINT,
        message: format!("Use GET {EVENTS_ENDPOINT} to fetch music events from Tazkarti.com"),
    })
}

/// Always answers 200; failures are reported in the body.
async fn list_events(State(state): State<AppState>) -> Json<EventsResponse> {
    match state.service.get_events().await {
        Ok(outcome) => {
            let events = with_default_location(
                outcome.events,
                state.service.config().default_location.as_deref(),
            );
            Json(EventsResponse::ok(events, outcome.cached))
        }
        Err(err) => {
            error!(error = %err, "events request failed");
            Json(EventsResponse::failed(err.to_string()))
        }
    }
}

fn with_default_location(
    mut events: Vec<CanonicalEvent>,
    default_location: Option<&str>,
) -> Vec<CanonicalEvent> {
    if let Some(fallback) = default_location {
        for event in events.iter_mut().filter(|e| e.location.trim().is_empty()) {
            event.location = fallback.to_string();
        }
    }
    events
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api", get(index))
        .route("/api/events", get(list_events))
        .route(EVENTS_ENDPOINT, get(list_events))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tazkarti_events=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub async fn run() -> anyhow::Result<()> {
    init_tracing();
    let config = AppConfig::load();

    let addr = config.bind_addr.clone();
    info!(
        feed = %config.feed_url,
        ttl_secs = config.cache_ttl_secs,
        "starting tazkarti events service"
    );
    let state = AppState::new(EventService::from_config(config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app(state))
        .await
        .context("server error")?;
    Ok(())
}
