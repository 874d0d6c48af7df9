use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::Signal;

/// Per-organization store of computed signal lists.
///
/// Entries are replaced as a whole. An entry is live for `now` in
/// `[computed_at, expires_at)`; there is no background eviction.
pub trait SignalCache: Send + Sync {
    fn get(&self, organization_id: &str, now: DateTime<Utc>) -> Option<Arc<Vec<Signal>>>;
    fn set(
        &self,
        organization_id: &str,
        signals: Arc<Vec<Signal>>,
        computed_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    );
    fn clear(&self);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    computed_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    signals: Arc<Vec<Signal>>,
}

#[derive(Debug, Default)]
pub struct InMemorySignalCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl InMemorySignalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SignalCache for InMemorySignalCache {
    fn get(&self, organization_id: &str, now: DateTime<Utc>) -> Option<Arc<Vec<Signal>>> {
        let entries = self.entries.lock();
        entries
            .get(organization_id)
            .filter(|entry| entry.computed_at <= now && now < entry.expires_at)
            .map(|entry| Arc::clone(&entry.signals))
    }

    fn set(
        &self,
        organization_id: &str,
        signals: Arc<Vec<Signal>>,
        computed_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) {
        self.entries.lock().insert(
            organization_id.to_string(),
            CacheEntry { computed_at, expires_at, signals },
        );
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        crate::window::parse_timestamp("2026-02-20T12:00:00Z").unwrap()
    }

    #[test]
    fn live_entry_is_shared() {
        let cache = InMemorySignalCache::new();
        let signals = Arc::new(Vec::new());
        cache.set("org_1", Arc::clone(&signals), now(), now() + Duration::seconds(60));

        let hit = cache.get("org_1", now() + Duration::seconds(59)).expect("live entry");
        assert!(Arc::ptr_eq(&hit, &signals));
        assert!(cache.get("org_2", now()).is_none());
    }

    #[test]
    fn expired_entry_misses() {
        let cache = InMemorySignalCache::new();
        cache.set("org_1", Arc::new(Vec::new()), now(), now() + Duration::seconds(60));
        assert!(cache.get("org_1", now() + Duration::seconds(60)).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn entry_misses_for_earlier_now() {
        let cache = InMemorySignalCache::new();
        cache.set("org_1", Arc::new(Vec::new()), now(), now() + Duration::seconds(60));
        assert!(cache.get("org_1", now() - Duration::seconds(1)).is_none());
        assert!(cache.get("org_1", now()).is_some());
    }

    #[test]
    fn clear_drops_everything() {
        let cache = InMemorySignalCache::new();
        cache.set("org_1", Arc::new(Vec::new()), now(), now() + Duration::seconds(60));
        cache.set("org_2", Arc::new(Vec::new()), now(), now() + Duration::seconds(60));
        cache.clear();
        assert!(cache.is_empty());
    }
}
