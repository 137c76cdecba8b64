use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// Serialized response; opaque to the cache.
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: String, payload: String) -> Self {
        Self {
            key,
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }
}
