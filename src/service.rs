use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::cache::EventCache;
use crate::canonical::Canonicalizer;
use crate::config::AppConfig;
use crate::fetch::{HttpFetcher, PageFetcher};
use crate::models::CanonicalEvent;
use crate::pipeline::{self, PipelineError};
use crate::scraping::AdapterChain;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    UpstreamUnavailable(String),
    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),
    #[error("extraction worker failed: {0}")]
    Worker(String),
}

impl From<PipelineError> for ServiceError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::UpstreamUnavailable(inner) => {
                ServiceError::UpstreamUnavailable(inner.to_string())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventsOutcome {
    pub events: Vec<CanonicalEvent>,
    pub cached: bool,
}

/// Everything a blocking extraction pass needs, shared with the worker thread.
struct Engine {
    chain: AdapterChain,
    canonicalizer: Canonicalizer,
    fetcher: Arc<dyn PageFetcher>,
}

/// Entry point for the HTTP shell: cached events, or one bounded upstream pass.
pub struct EventService {
    config: Arc<AppConfig>,
    engine: Arc<Engine>,
    cache: Arc<EventCache>,
    refresh: Arc<Mutex<()>>,
}

impl EventService {
    pub fn new(config: AppConfig, fetcher: Arc<dyn PageFetcher>) -> Self {
        let engine = Engine {
            chain: AdapterChain::standard(&config),
            canonicalizer: Canonicalizer::from_config(&config),
            fetcher,
        };
        let cache = EventCache::new(config.cache_ttl());
        debug!(
            adapters = ?engine.chain.adapter_ids(),
            ttl = ?cache.ttl(),
            "event service ready"
        );
        Self {
            cache: Arc::new(cache),
            config: Arc::new(config),
            engine: Arc::new(engine),
            refresh: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(config: AppConfig) -> Self {
        let fetcher = Arc::new(HttpFetcher::from_config(&config));
        Self::new(config, fetcher)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &EventCache {
        &self.cache
    }

    /// Serves from cache while fresh. On a miss, a single refresh runs at a
    /// time; callers queued behind it re-check the cache before fetching.
    pub async fn get_events(&self) -> Result<EventsOutcome, ServiceError> {
        if let Some(events) = self.cache.get() {
            info!(count = events.len(), "cache hit");
            return Ok(EventsOutcome {
                events,
                cached: true,
            });
        }

        let limit = self.config.pipeline_timeout();
        let guard = match tokio::time::timeout(limit, Arc::clone(&self.refresh).lock_owned()).await
        {
            Ok(guard) => guard,
            Err(_) => {
                warn!(timeout = ?limit, "timed out waiting for a running refresh");
                return Err(ServiceError::Timeout(limit));
            }
        };
        if let Some(events) = self.cache.get() {
            info!(count = events.len(), "cache filled by concurrent refresh");
            return Ok(EventsOutcome {
                events,
                cached: true,
            });
        }

        info!("cache miss, fetching upstream");
        let events = self.refresh_events(guard, limit).await?;
        Ok(EventsOutcome {
            events,
            cached: false,
        })
    }

    /// Runs one extraction pass and caches its result. A pass that outlives
    /// `limit` keeps the refresh lock until it finishes and still fills the
    /// cache, so no second pass starts beside it.
    async fn refresh_events(
        &self,
        guard: OwnedMutexGuard<()>,
        limit: Duration,
    ) -> Result<Vec<CanonicalEvent>, ServiceError> {
        let engine = Arc::clone(&self.engine);
        let now = Utc::now();

        let mut task = tokio::task::spawn_blocking(move || {
            pipeline::extract_events(
                &engine.chain,
                engine.fetcher.as_ref(),
                &engine.canonicalizer,
                now,
            )
        });

        match tokio::time::timeout(limit, &mut task).await {
            Err(_) => {
                warn!(timeout = ?limit, "extraction timed out");
                let cache = Arc::clone(&self.cache);
                tokio::spawn(async move {
                    let _guard = guard;
                    if let Ok(Ok(extraction)) = task.await {
                        info!(count = extraction.events.len(), "late extraction cached");
                        cache.put(extraction.events);
                    }
                });
                Err(ServiceError::Timeout(limit))
            }
            Ok(Err(join_err)) => {
                warn!(error = %join_err, "extraction worker failed");
                Err(ServiceError::Worker(join_err.to_string()))
            }
            Ok(Ok(Err(err))) => {
                warn!(error = %err, "extraction failed");
                Err(err.into())
            }
            Ok(Ok(Ok(extraction))) => {
                self.cache.put(extraction.events.clone());
                Ok(extraction.events)
            }
        }
    }
}
