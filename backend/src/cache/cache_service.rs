use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::CacheStore;
use super::models::CacheEntry;

/// In-process entries kept before the oldest are evicted.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Fingerprint-keyed response cache: an in-process map in front of an
/// optional durable store. Durable failures are logged and swallowed.
pub struct PredictionCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    store: Option<Arc<dyn CacheStore>>,
    ttl: Duration,
    capacity: usize,
    // Durable upserts never overlap.
    write_lock: tokio::sync::Mutex<()>,
}

impl PredictionCache {
    pub fn new(store: Option<Arc<dyn CacheStore>>, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            store,
            ttl,
            capacity: DEFAULT_CAPACITY,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(None, ttl)
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Number of entries held in process, expired or not.
    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the live entry for `fingerprint`; expired entries read as absent
    /// and are dropped from memory.
    pub async fn get(&self, fingerprint: &str) -> Option<CacheEntry> {
        let now = Utc::now();

        if let Some(entry) = self.memory_get(fingerprint) {
            if entry.is_expired(now, self.ttl) {
                log::debug!("Cached prediction {} expired", fingerprint);
                self.memory_remove_expired(fingerprint, now);
                return None;
            }
            return Some(entry);
        }

        let store = self.store.as_ref()?;
        match store.get(fingerprint).await {
            Ok(Some(entry)) if !entry.is_expired(now, self.ttl) => {
                self.memory_put(entry.clone());
                Some(entry)
            }
            Ok(_) => None,
            Err(e) => {
                log::warn!("Cache retrieval failed for {}: {}", fingerprint, e);
                None
            }
        }
    }

    /// Upserts `payload` under `fingerprint`, stamped with the current time.
    pub async fn put(&self, fingerprint: &str, payload: String) {
        self.put_entry(CacheEntry::new(fingerprint.to_string(), payload))
            .await;
    }

    pub async fn put_entry(&self, entry: CacheEntry) {
        self.memory_put(entry.clone());
        if let Some(store) = &self.store {
            let _guard = self.write_lock.lock().await;
            if let Err(e) = store.upsert(&entry).await {
                log::warn!("Cache storage failed for {}: {}", entry.key, e);
            }
        }
    }

    fn memory_get(&self, fingerprint: &str) -> Option<CacheEntry> {
        match self.entries.read() {
            Ok(entries) => entries.get(fingerprint).cloned(),
            Err(poisoned) => poisoned.into_inner().get(fingerprint).cloned(),
        }
    }

    fn memory_remove_expired(&self, fingerprint: &str, now: DateTime<Utc>) {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        // A concurrent put may have refreshed the key since it was read.
        if entries
            .get(fingerprint)
            .is_some_and(|entry| entry.is_expired(now, self.ttl))
        {
            entries.remove(fingerprint);
        }
    }

    fn memory_put(&self, entry: CacheEntry) {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !entries.contains_key(&entry.key) && entries.len() >= self.capacity {
            let now = Utc::now();
            entries.retain(|_, cached| !cached.is_expired(now, self.ttl));
            if entries.len() >= self.capacity {
                let oldest = entries
                    .values()
                    .min_by_key(|cached| cached.created_at)
                    .map(|cached| cached.key.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(entry.key.clone(), entry);
    }
}
