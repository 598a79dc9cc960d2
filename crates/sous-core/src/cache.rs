//! Time-bounded memoization of extraction results.
//!
//! Storage is a bounded moka cache; expiry is decided against the injected
//! [`Clock`] so that an entry is logically absent the moment `now >= expires_at`,
//! whatever moka's own eviction schedule is doing.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::ops::compute::{CompResult, Op};
use moka::sync::Cache;

use crate::clock::{Clock, add_duration};
use crate::models::{ExtractionResult, RecipeQuery};

/// One memoized result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub value: ExtractionResult,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Cache capacity and entry lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(86_400),
            max_entries: 10_000,
        }
    }
}

pub struct CacheStore {
    entries: Cache<String, Arc<CacheEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_entries)
            .build();
        Self {
            entries,
            ttl: config.ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a query. Expired entries are a miss and are evicted on the spot.
    pub fn get(&self, query: &RecipeQuery) -> Option<ExtractionResult> {
        self.get_by_key(&query.cache_key())
    }

    pub fn get_by_key(&self, key: &str) -> Option<ExtractionResult> {
        let entry = self.entries.get(key)?;
        let now = self.clock.now();
        if entry.is_valid_at(now) {
            return Some(entry.value.clone());
        }
        if self.evict_if_expired(key, now) {
            tracing::debug!(key, "Evicted expired cache entry");
        }
        None
    }

    /// Remove the entry stored under `key` only if the entry stored there
    /// right now is expired. A concurrent `put` that replaced it survives.
    fn evict_if_expired(&self, key: &str, now: DateTime<Utc>) -> bool {
        let outcome = self
            .entries
            .entry_by_ref(key)
            .and_compute_with(|current| match current {
                Some(entry) if !entry.value().is_valid_at(now) => Op::Remove,
                _ => Op::Nop,
            });
        matches!(outcome, CompResult::Removed(_))
    }

    /// Store a result, replacing whatever was there.
    pub fn put(&self, query: &RecipeQuery, value: ExtractionResult) {
        self.put_by_key(query.cache_key(), value);
    }

    pub fn put_by_key(&self, key: String, value: ExtractionResult) {
        let created_at = self.clock.now();
        let entry = CacheEntry {
            key: key.clone(),
            value,
            created_at,
            expires_at: add_duration(created_at, self.ttl),
        };
        self.entries.insert(key, Arc::new(entry));
    }

    /// Drop every entry that has expired by now.
    /// Returns how many entries were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let expired: Vec<Arc<String>> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_valid_at(now))
            .map(|(key, _)| key)
            .collect();
        let removed = expired
            .iter()
            .filter(|key| self.evict_if_expired(key.as_str(), now))
            .count();
        self.entries.run_pending_tasks();
        if removed > 0 {
            tracing::debug!(removed, "Swept expired cache entries");
        }
        removed
    }

    /// Approximate number of stored entries, expired ones included until swept.
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::ProviderKind;

    fn result(step: &str) -> ExtractionResult {
        ExtractionResult {
            steps: vec![step.to_string()],
            ingredients: vec!["water".to_string()],
            source_provider: ProviderKind::Edamam,
            source_url_or_id: "abc".to_string(),
            title: None,
            content_hash: "0".repeat(64),
            extracted_at: Utc::now(),
        }
    }

    fn store(ttl_secs: u64) -> (CacheStore, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let store = CacheStore::new(
            CacheConfig {
                ttl: Duration::from_secs(ttl_secs),
                max_entries: 100,
            },
            Arc::new(clock.clone()),
        );
        (store, clock)
    }

    #[test]
    fn entry_is_served_until_it_expires() {
        let (store, clock) = store(3600);
        let query = RecipeQuery::search("pasta", 1);
        store.put(&query, result("Boil water"));

        clock.advance(Duration::from_secs(3599));
        let hit = store.get(&query).expect("entry should still be valid");
        assert_eq!(hit.steps, vec!["Boil water".to_string()]);

        clock.advance(Duration::from_secs(2));
        assert_eq!(store.get(&query), None);
    }

    #[test]
    fn expiry_is_exclusive_at_the_boundary() {
        let (store, clock) = store(60);
        let query = RecipeQuery::provider_id("abc");
        store.put(&query, result("Stir"));
        clock.advance(Duration::from_secs(60));
        assert!(store.get(&query).is_none());
    }

    #[test]
    fn equivalent_queries_share_an_entry() {
        let (store, _clock) = store(60);
        store.put(&RecipeQuery::search("  Pasta ", 2), result("Boil"));
        assert!(store.get(&RecipeQuery::search("pasta", 2)).is_some());
        assert!(store.get(&RecipeQuery::search("pasta", 3)).is_none());
    }

    #[test]
    fn put_overwrites_and_refreshes_expiry() {
        let (store, clock) = store(100);
        let query = RecipeQuery::url("https://example.com/r");
        store.put(&query, result("old"));
        clock.advance(Duration::from_secs(90));
        store.put(&query, result("new"));
        clock.advance(Duration::from_secs(50));

        let hit = store.get(&query).unwrap();
        assert_eq!(hit.steps, vec!["new".to_string()]);
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let (store, clock) = store(100);
        store.put(&RecipeQuery::provider_id("old"), result("a"));
        clock.advance(Duration::from_secs(60));
        store.put(&RecipeQuery::provider_id("fresh"), result("b"));
        clock.advance(Duration::from_secs(50));

        assert_eq!(store.sweep_expired(), 1);

        assert_eq!(store.len(), 1);
        assert!(store.get(&RecipeQuery::provider_id("fresh")).is_some());
    }

    #[test]
    fn eviction_spares_an_entry_refreshed_after_the_expiry_check() {
        let (store, clock) = store(60);
        let query = RecipeQuery::search("pasta", 1);
        let key = query.cache_key();
        store.put(&query, result("stale"));
        clock.advance(Duration::from_secs(61));

        // A reader saw the stale entry; a refresh lands before it evicts.
        let seen_at = clock.now();
        store.put(&query, result("fresh"));
        assert!(!store.evict_if_expired(&key, seen_at));

        let hit = store.get(&query).expect("refreshed entry must survive");
        assert_eq!(hit.steps, vec!["fresh".to_string()]);
    }

    #[test]
    fn eviction_removes_an_entry_still_expired() {
        let (store, clock) = store(60);
        let query = RecipeQuery::provider_id("abc");
        store.put(&query, result("stale"));
        clock.advance(Duration::from_secs(60));
        assert!(store.evict_if_expired(&query.cache_key(), clock.now()));
        assert!(store.is_empty());
        assert!(!store.evict_if_expired(&query.cache_key(), clock.now()));
    }

    #[test]
    fn sweep_keeps_entries_refreshed_since_expiry() {
        let (store, clock) = store(60);
        let refreshed = RecipeQuery::provider_id("refreshed");
        let abandoned = RecipeQuery::provider_id("abandoned");
        store.put(&refreshed, result("old"));
        store.put(&abandoned, result("old"));
        clock.advance(Duration::from_secs(61));
        store.put(&refreshed, result("new"));

        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.get(&refreshed).unwrap().steps, vec!["new".to_string()]);
        assert!(store.get(&abandoned).is_none());
    }
}
