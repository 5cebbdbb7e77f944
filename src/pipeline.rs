use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::canonical::Canonicalizer;
use crate::fetch::PageFetcher;
use crate::filter;
use crate::models::{AdapterId, CanonicalEvent};
use crate::scraping::{AdapterChain, UpstreamUnavailable};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    UpstreamUnavailable(#[from] UpstreamUnavailable),
}

#[derive(Debug, Default)]
pub struct Extraction {
    /// Adapter whose output was used; `None` when every adapter came back empty.
    pub adapter: Option<AdapterId>,
    pub events: Vec<CanonicalEvent>,
}

/// One synchronous pass: adapters, duplicate removal on raw text,
/// canonicalization, then the upcoming filter against `now`.
pub fn extract_events(
    chain: &AdapterChain,
    fetcher: &dyn PageFetcher,
    canonicalizer: &Canonicalizer,
    now: DateTime<Utc>,
) -> Result<Extraction, PipelineError> {
    let outcome = chain.run(fetcher)?;
    let found = outcome.candidates.len();

    let candidates = filter::dedup_raw(outcome.candidates);
    let unique = candidates.len();
    let events = canonicalizer.canonicalize_all(&candidates);
    let events = filter::retain_upcoming(events, now);

    info!(
        adapter = outcome.adapter.map(|a| a.as_str()).unwrap_or("none"),
        found,
        unique,
        upcoming = events.len(),
        "extraction finished"
    );

    Ok(Extraction {
        adapter: outcome.adapter,
        events,
    })
}
