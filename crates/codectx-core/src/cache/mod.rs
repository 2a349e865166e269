//! Context cache
//!
//! Bounded short-term store with TTL, item-count, and byte-size caps, plus
//! an optional persistent key-value backend (pluggable; the in-memory stub
//! stands in for a browser-style store). Eviction is priority-driven; the
//! default priority blends recency, frequency, and inverse size.

use crate::error::{CodectxError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Snapshot of an entry fed to the priority function
#[derive(Debug, Clone)]
pub struct CacheEntryInfo {
    pub key: String,
    pub size: usize,
    pub hits: u64,
    pub age: Duration,
    pub idle: Duration,
}

pub type PriorityFn = Arc<dyn Fn(&CacheEntryInfo) -> f64 + Send + Sync>;

/// Eviction policy
#[derive(Clone)]
pub struct CachePolicy {
    pub max_age: Duration,
    /// Total value bytes kept in the short-term store
    pub max_size: usize,
    pub max_items: usize,
    /// Higher priority survives longer; `None` uses the built-in blend.
    pub priority: Option<PriorityFn>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(3600),
            max_size: 5 * 1024 * 1024,
            max_items: 1000,
            priority: None,
        }
    }
}

impl std::fmt::Debug for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePolicy")
            .field("max_age", &self.max_age)
            .field("max_size", &self.max_size)
            .field("max_items", &self.max_items)
            .field("priority", &self.priority.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Recency, frequency, and inverse size, blended.
fn default_priority(info: &CacheEntryInfo) -> f64 {
    let recency = 1.0 / (1.0 + info.idle.as_secs_f64());
    let frequency = (info.hits.min(10)) as f64 / 10.0;
    let size = 1.0 / (1.0 + info.size as f64 / 1024.0);
    0.5 * recency + 0.3 * frequency + 0.2 * size
}

/// Pluggable persistent key-value backend
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
}

/// In-memory stand-in for a browser-style persistent store
#[derive(Default)]
pub struct InMemoryPersistentStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryPersistentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistentStore for InMemoryPersistentStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .read()
            .map_err(|_| CodectxError::Storage("persistent store lock poisoned".to_string()))?
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| CodectxError::Storage("persistent store lock poisoned".to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self
            .entries
            .write()
            .map_err(|_| CodectxError::Storage("persistent store lock poisoned".to_string()))?
            .remove(key)
            .is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| CodectxError::Storage("persistent store lock poisoned".to_string()))?
            .clear();
        Ok(())
    }
}

#[derive(Clone)]
struct CacheEntry {
    value: String,
    created: Instant,
    last_access: Instant,
    hits: u64,
}

/// Cache statistics
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
    pub total_size: usize,
}

/// Short-term cache with optional persistent promotion
pub struct ContextCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    policy: CachePolicy,
    persistent: Option<Arc<dyn PersistentStore>>,
}

impl ContextCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            policy,
            persistent: None,
        }
    }

    pub fn with_persistent(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.persistent = Some(store);
        self
    }

    /// Get a value if present and unexpired; refreshes recency/frequency.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.write().ok()?;
        let entry = entries.get_mut(key)?;
        if entry.created.elapsed() >= self.policy.max_age {
            entries.remove(key);
            return None;
        }
        entry.last_access = Instant::now();
        entry.hits += 1;
        Some(entry.value.clone())
    }

    /// Insert a value, then enforce TTL expiry and the item/size caps.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let now = Instant::now();
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                key.into(),
                CacheEntry {
                    value: value.into(),
                    created: now,
                    last_access: now,
                    hits: 0,
                },
            );
            self.enforce_policy(&mut entries);
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries
            .read()
            .map(|entries| {
                entries
                    .get(key)
                    .map(|e| e.created.elapsed() < self.policy.max_age)
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries
            .write()
            .map(|mut entries| entries.remove(key).is_some())
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    /// Promote keys likely to be needed soon from the persistent store into
    /// the short-term cache. Keys already cached are left alone.
    pub async fn preload_probable(&self, keys: &[String]) -> Result<usize> {
        let store = match &self.persistent {
            Some(store) => store.clone(),
            None => return Ok(0),
        };
        let mut promoted = 0;
        for key in keys {
            if self.has(key) {
                continue;
            }
            if let Some(value) = store.get(key).await? {
                self.set(key.clone(), value);
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    /// Drop the bottom half of the short-term entries by priority. The
    /// persistent store is untouched.
    pub fn evict_unlikely(&self) {
        if let Ok(mut entries) = self.entries.write() {
            let mut ranked: Vec<(String, f64)> = entries
                .iter()
                .map(|(key, entry)| (key.clone(), self.priority_of(key, entry)))
                .collect();
            ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            for (key, _) in ranked.iter().take(ranked.len() / 2) {
                entries.remove(key);
            }
        }
    }

    /// Persist a value through to the backing store, if one is attached.
    pub async fn set_persistent(&self, key: &str, value: &str) -> Result<()> {
        self.set(key.to_string(), value.to_string());
        if let Some(store) = &self.persistent {
            store.set(key, value).await?;
        }
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        match self.entries.read() {
            Ok(entries) => {
                let total = entries.len();
                let expired = entries
                    .values()
                    .filter(|e| e.created.elapsed() >= self.policy.max_age)
                    .count();
                let total_size = entries.values().map(|e| e.value.len()).sum();
                CacheStats {
                    total_entries: total,
                    expired_entries: expired,
                    active_entries: total - expired,
                    total_size,
                }
            }
            Err(_) => CacheStats::default(),
        }
    }

    fn priority_of(&self, key: &str, entry: &CacheEntry) -> f64 {
        let info = CacheEntryInfo {
            key: key.to_string(),
            size: entry.value.len(),
            hits: entry.hits,
            age: entry.created.elapsed(),
            idle: entry.last_access.elapsed(),
        };
        match &self.policy.priority {
            Some(priority) => priority(&info),
            None => default_priority(&info),
        }
    }

    fn enforce_policy(&self, entries: &mut HashMap<String, CacheEntry>) {
        entries.retain(|_, e| e.created.elapsed() < self.policy.max_age);

        let over_items = entries.len().saturating_sub(self.policy.max_items);
        let total_size: usize = entries.values().map(|e| e.value.len()).sum();
        if over_items == 0 && total_size <= self.policy.max_size {
            return;
        }

        let mut ranked: Vec<(String, f64, usize)> = entries
            .iter()
            .map(|(key, entry)| (key.clone(), self.priority_of(key, entry), entry.value.len()))
            .collect();
        ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut size = total_size;
        for (key, _, entry_size) in ranked {
            if entries.len() <= self.policy.max_items && size <= self.policy.max_size {
                break;
            }
            entries.remove(&key);
            size -= entry_size;
        }
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_age_ms: u64, max_items: usize) -> CachePolicy {
        CachePolicy {
            max_age: Duration::from_millis(max_age_ms),
            max_size: usize::MAX,
            max_items,
            priority: None,
        }
    }

    #[test]
    fn test_cache_basic() {
        let cache = ContextCache::default();
        cache.set("key1", "value1");
        assert_eq!(cache.get("key1"), Some("value1".to_string()));
        assert_eq!(cache.get("key2"), None);
        assert!(cache.has("key1"));
        assert!(cache.delete("key1"));
        assert!(!cache.has("key1"));
    }

    #[test]
    fn test_cache_expiry() {
        let cache = ContextCache::new(policy(50, 100));
        cache.set("key1", "value1");
        assert_eq!(cache.get("key1"), Some("value1".to_string()));

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(cache.get("key1"), None);
        assert!(!cache.has("key1"));
    }

    #[test]
    fn test_item_cap_enforced_after_set() {
        let cache = ContextCache::new(policy(60_000, 3));
        for i in 0..10 {
            cache.set(format!("key{i}"), "v");
        }
        assert!(cache.stats().total_entries <= 3);
    }

    #[test]
    fn test_size_cap_evicts() {
        let cache = ContextCache::new(CachePolicy {
            max_age: Duration::from_secs(60),
            max_size: 100,
            max_items: 1000,
            priority: None,
        });
        cache.set("big1", "x".repeat(80));
        cache.set("big2", "y".repeat(80));
        assert!(cache.stats().total_size <= 100);
    }

    #[test]
    fn test_custom_priority_controls_eviction() {
        let keep_bravo: PriorityFn =
            Arc::new(|info| if info.key == "bravo" { 1.0 } else { 0.0 });
        let cache = ContextCache::new(CachePolicy {
            max_age: Duration::from_secs(60),
            max_size: usize::MAX,
            max_items: 1,
            priority: Some(keep_bravo),
        });
        cache.set("alpha", "a");
        cache.set("bravo", "b");
        assert!(cache.has("bravo"));
        assert!(!cache.has("alpha"));
    }

    #[test]
    fn test_evict_unlikely_drops_bottom_half() {
        let cache = ContextCache::new(policy(60_000, 100));
        for i in 0..4 {
            cache.set(format!("key{i}"), "v");
        }
        // Touch two entries so they outrank the rest.
        cache.get("key0");
        cache.get("key1");

        cache.evict_unlikely();
        let stats = cache.stats();
        assert_eq!(stats.total_entries, 2);
        assert!(cache.has("key0"));
        assert!(cache.has("key1"));
    }

    #[tokio::test]
    async fn test_preload_probable_promotes_from_persistent() {
        let store = Arc::new(InMemoryPersistentStore::new());
        store.set("warm", "from-disk").await.unwrap();

        let cache = ContextCache::default().with_persistent(store);
        let promoted = cache
            .preload_probable(&["warm".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(promoted, 1);
        assert_eq!(cache.get("warm"), Some("from-disk".to_string()));
    }

    #[tokio::test]
    async fn test_set_persistent_writes_through() {
        let store = Arc::new(InMemoryPersistentStore::new());
        let cache = ContextCache::default().with_persistent(store.clone());

        cache.set_persistent("key", "value").await.unwrap();
        assert_eq!(store.get("key").await.unwrap(), Some("value".to_string()));
        assert_eq!(cache.get("key"), Some("value".to_string()));
    }

    #[test]
    fn test_stats_counts() {
        let cache = ContextCache::new(policy(60_000, 100));
        cache.set("a", "xx");
        cache.set("b", "yyy");
        let stats = cache.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.active_entries, 2);
        assert_eq!(stats.total_size, 5);
    }
}
