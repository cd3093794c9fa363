//! In-memory store.
//!
//! Nothing survives a restart. [`UrlTable`] is also the in-memory half of
//! the file backend.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::models::{
    PutOutcome, ResolvedUrl, SEED_ORIGINAL_URL, SEED_SHORT_KEY, SYSTEM_OWNER, StoreCapabilities,
    UrlRecord,
};
use super::Store;
use crate::errors::Result;

#[derive(Debug, Clone)]
struct Entry {
    original_url: String,
    owner_id: i64,
    retired: bool,
}

/// Bidirectional key/URL maps plus per-key ownership and retirement.
///
/// Not synchronized; callers wrap it in a lock.
#[derive(Debug, Default)]
pub(crate) struct UrlTable {
    long_to_short: HashMap<String, String>,
    short_to_entry: HashMap<String, Entry>,
}

impl UrlTable {
    pub(crate) fn new(seed: bool) -> Self {
        let mut table = Self::default();
        if seed {
            table.restore(SEED_SHORT_KEY, SEED_ORIGINAL_URL);
        }
        table
    }

    pub(crate) fn short_for(&self, original_url: &str) -> Option<&str> {
        self.long_to_short.get(original_url).map(String::as_str)
    }

    /// Inserts a new mapping; a known long URL yields `Conflict`.
    pub(crate) fn insert(&mut self, short_key: &str, original_url: &str, owner_id: i64) -> PutOutcome {
        if let Some(existing) = self.short_for(original_url) {
            return PutOutcome::Conflict(existing.to_string());
        }
        if let Some(previous) = self.short_to_entry.get(short_key) {
            warn!(
                "Short key {} already maps to {}, overwriting with {}",
                short_key, previous.original_url, original_url
            );
        }
        self.set(short_key, original_url, owner_id);
        PutOutcome::Created(short_key.to_string())
    }

    /// Replays a persisted mapping. Later lines win, as they did when written.
    pub(crate) fn restore(&mut self, short_key: &str, original_url: &str) {
        self.set(short_key, original_url, SYSTEM_OWNER);
    }

    fn set(&mut self, short_key: &str, original_url: &str, owner_id: i64) {
        self.long_to_short
            .insert(original_url.to_string(), short_key.to_string());
        self.short_to_entry.insert(
            short_key.to_string(),
            Entry {
                original_url: original_url.to_string(),
                owner_id,
                retired: false,
            },
        );
    }

    pub(crate) fn resolve(&self, short_key: &str) -> Option<ResolvedUrl> {
        self.short_to_entry.get(short_key).map(|e| ResolvedUrl {
            original_url: e.original_url.clone(),
            retired: e.retired,
        })
    }

    pub(crate) fn list_by_owner(&self, owner_id: i64) -> Vec<UrlRecord> {
        self.short_to_entry
            .iter()
            .filter(|(_, e)| e.owner_id == owner_id)
            .map(|(key, e)| UrlRecord {
                short_key: key.clone(),
                original_url: e.original_url.clone(),
                owner_id: e.owner_id,
                retired: e.retired,
            })
            .collect()
    }

    /// Marks owned, not yet retired keys as retired. Returns how many changed.
    pub(crate) fn retire(&mut self, short_keys: &[String], owner_id: i64) -> u64 {
        let wanted: HashSet<&str> = short_keys.iter().map(String::as_str).collect();
        let mut changed = 0;
        for key in wanted {
            if let Some(entry) = self.short_to_entry.get_mut(key)
                && entry.owner_id == owner_id
                && !entry.retired
            {
                entry.retired = true;
                changed += 1;
            }
        }
        changed
    }

    pub(crate) fn len(&self) -> usize {
        self.short_to_entry.len()
    }
}

/// Store backed by two maps behind one read-write lock.
pub struct MemoryStore {
    table: RwLock<UrlTable>,
}

impl MemoryStore {
    pub fn new(seed: bool) -> Self {
        Self {
            table: RwLock::new(UrlTable::new(seed)),
        }
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, short_key: &str, original_url: &str, owner_id: i64) -> Result<PutOutcome> {
        Ok(self.table.write().insert(short_key, original_url, owner_id))
    }

    async fn resolve_short(&self, short_key: &str) -> Result<Option<ResolvedUrl>> {
        Ok(self.table.read().resolve(short_key))
    }

    async fn resolve_long(&self, original_url: &str) -> Result<Option<String>> {
        Ok(self.table.read().short_for(original_url).map(str::to_string))
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<UrlRecord>> {
        Ok(self.table.read().list_by_owner(owner_id))
    }

    async fn retire_batch(&self, short_keys: &[String], owner_id: i64) -> Result<u64> {
        let changed = self.table.write().retire(short_keys, owner_id);
        debug!(
            "Retired {} of {} keys for owner {}",
            changed,
            short_keys.len(),
            owner_id
        );
        Ok(changed)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            persistent: false,
            persists_retirement: false,
            persists_owner: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn test_seed_fixture_present() {
        let store = MemoryStore::new(true);
        let resolved = store.resolve_short(SEED_SHORT_KEY).await.unwrap().unwrap();
        assert_eq!(resolved.original_url, SEED_ORIGINAL_URL);
        assert!(!resolved.retired);

        let empty = MemoryStore::new(false);
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_put_then_conflict_keeps_first_owner() {
        let store = MemoryStore::new(false);
        let first = store.put("k1", "https://example.com/x", 1).await.unwrap();
        assert_eq!(first, PutOutcome::Created("k1".to_string()));

        let second = store.put("k1", "https://example.com/x", 2).await.unwrap();
        assert_eq!(second, PutOutcome::Conflict("k1".to_string()));

        assert_eq!(store.list_by_owner(1).await.unwrap().len(), 1);
        assert!(store.list_by_owner(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_long_and_missing() {
        let store = MemoryStore::new(false);
        store.put("k1", "https://a.example", 1).await.unwrap();
        assert_eq!(
            store.resolve_long("https://a.example").await.unwrap(),
            Some("k1".to_string())
        );
        assert_eq!(store.resolve_long("https://b.example").await.unwrap(), None);
        assert_eq!(store.resolve_short("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_retire_only_owned_keys() {
        let store = MemoryStore::new(false);
        store.put("k1", "https://a.example", 1).await.unwrap();
        store.put("k2", "https://b.example", 2).await.unwrap();

        let changed = store.retire_batch(&keys(&["k1", "k2", "missing"]), 1).await.unwrap();
        assert_eq!(changed, 1);
        assert!(store.resolve_short("k1").await.unwrap().unwrap().retired);
        assert!(!store.resolve_short("k2").await.unwrap().unwrap().retired);

        // second retirement is a no-op
        assert_eq!(store.retire_batch(&keys(&["k1"]), 1).await.unwrap(), 0);
        assert!(store.resolve_short("k1").await.unwrap().unwrap().retired);
    }

    #[tokio::test]
    async fn test_duplicate_keys_in_batch_counted_once() {
        let store = MemoryStore::new(false);
        store.put("k1", "https://a.example", 7).await.unwrap();
        let changed = store.retire_batch(&keys(&["k1", "k1"]), 7).await.unwrap();
        assert_eq!(changed, 1);
    }

    #[tokio::test]
    async fn test_concurrent_puts_same_url_single_creation() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new(false));
        let mut handles = vec![];
        for owner in 0..16i64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.put("same", "https://same.example", owner).await.unwrap()
            }));
        }

        let mut created = 0;
        for handle in handles {
            if !handle.await.unwrap().is_conflict() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.len(), 1);
    }
}
