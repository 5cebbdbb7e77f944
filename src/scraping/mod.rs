pub mod base;
pub mod dom_heuristic;
pub mod embedded_json;
pub mod link_fallback;
pub mod structured_feed;

use std::fmt;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::fetch::PageFetcher;
use crate::models::{AdapterId, RawCandidate};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// The upstream's JSON event feed.
    Feed,
    /// The listing page markup.
    Markup,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKind::Feed => f.write_str("feed"),
            PayloadKind::Markup => f.write_str("markup"),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Payload {
    Feed(Vec<Value>),
    Markup(String),
}

/// One extraction strategy. Implementations never fail: anything they
/// cannot read yields an empty list so the chain moves on.
pub trait SourceAdapter: Send + Sync {
    fn adapter_id(&self) -> AdapterId;
    fn payload_kind(&self) -> PayloadKind;
    fn extract(&self, payload: &Payload) -> Vec<RawCandidate>;
}

#[derive(Debug, thiserror::Error)]
#[error("upstream unavailable: {0}")]
pub struct UpstreamUnavailable(pub String);

#[derive(Debug, Default)]
pub struct ChainOutcome {
    pub adapter: Option<AdapterId>,
    pub candidates: Vec<RawCandidate>,
}

pub struct AdapterChain {
    adapters: Vec<Box<dyn SourceAdapter>>,
}

impl AdapterChain {
    pub fn new(adapters: Vec<Box<dyn SourceAdapter>>) -> Self {
        Self { adapters }
    }

    /// Feed, embedded JSON, DOM heuristic, link fallback.
    pub fn standard(config: &AppConfig) -> Self {
        Self::new(vec![
            Box::new(structured_feed::StructuredFeed::from_config(config)),
            Box::new(embedded_json::EmbeddedJson),
            Box::new(dom_heuristic::DomHeuristic::new(
                &config.site_url,
                dom_heuristic::DomBounds::default(),
            )),
            Box::new(link_fallback::LinkFallback::new(&config.site_url)),
        ])
    }

    pub fn adapter_ids(&self) -> Vec<AdapterId> {
        self.adapters.iter().map(|a| a.adapter_id()).collect()
    }

    /// Runs adapters in order and keeps the first non-empty result. Each
    /// payload kind is fetched at most once, and only when an adapter needs it.
    pub fn run(&self, fetcher: &dyn PageFetcher) -> Result<ChainOutcome, UpstreamUnavailable> {
        let mut loaded: Vec<(PayloadKind, Option<Payload>)> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        for adapter in &self.adapters {
            let kind = adapter.payload_kind();
            if !loaded.iter().any(|(k, _)| *k == kind) {
                let payload = match fetcher.fetch(kind) {
                    Ok(payload) => Some(payload),
                    Err(err) => {
                        warn!(payload = %kind, error = %err, "payload fetch failed");
                        errors.push(format!("{kind}: {err}"));
                        None
                    }
                };
                loaded.push((kind, payload));
            }

            let payload = loaded
                .iter()
                .find(|(k, _)| *k == kind)
                .and_then(|(_, payload)| payload.as_ref());
            let Some(payload) = payload else {
                continue;
            };

            let candidates = adapter.extract(payload);
            debug!(
                adapter = %adapter.adapter_id(),
                count = candidates.len(),
                "adapter finished"
            );
            if !candidates.is_empty() {
                info!(
                    adapter = %adapter.adapter_id(),
                    count = candidates.len(),
                    "using adapter result"
                );
                return Ok(ChainOutcome {
                    adapter: Some(adapter.adapter_id()),
                    candidates,
                });
            }
        }

        if !errors.is_empty() && loaded.iter().all(|(_, payload)| payload.is_none()) {
            return Err(UpstreamUnavailable(errors.join("; ")));
        }

        info!("no adapter produced candidates");
        Ok(ChainOutcome::default())
    }
}
