use std::sync::RwLock;
use std::time::Duration;

use chrono::Utc;

use crate::models::CanonicalEvent;

#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    pub events: Option<Vec<CanonicalEvent>>,
    pub fetched_at_ms: Option<i64>,
}

/// One slot holding the last successful result set. The whole set expires
/// together once `ttl` has passed since it was stored.
#[derive(Debug)]
pub struct EventCache {
    slot: RwLock<CacheEntry>,
    ttl: Duration,
}

impl EventCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: RwLock::new(CacheEntry::default()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self) -> Option<Vec<CanonicalEvent>> {
        self.get_at(Utc::now().timestamp_millis())
    }

    pub fn put(&self, events: Vec<CanonicalEvent>) {
        self.put_at(events, Utc::now().timestamp_millis());
    }

    /// Hit only for a non-empty set younger than the TTL.
    pub fn get_at(&self, now_ms: i64) -> Option<Vec<CanonicalEvent>> {
        let entry = match self.slot.read() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        };
        let fetched_at = entry.fetched_at_ms?;
        let events = entry.events.as_ref().filter(|events| !events.is_empty())?;
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        if now_ms.saturating_sub(fetched_at) < ttl_ms {
            Some(events.clone())
        } else {
            None
        }
    }

    pub fn put_at(&self, events: Vec<CanonicalEvent>, now_ms: i64) {
        let mut entry = match self.slot.write() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        };
        *entry = CacheEntry {
            events: Some(events),
            fetched_at_ms: Some(now_ms),
        };
    }

    pub fn snapshot(&self) -> CacheEntry {
        match self.slot.read() {
            Ok(guard) => guard.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }
}
