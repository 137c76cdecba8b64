pub mod cache_service;
pub mod dynamodb_store;
pub mod file_store;
pub mod models;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use models::CacheEntry;

#[derive(Debug, thiserror::Error)]
pub enum CacheStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
    #[error("Invalid data format: {0}")]
    InvalidData(String),
}

/// Durable key-value storage behind the prediction cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError>;

    /// Inserts or replaces the entry stored under `entry.key`.
    async fn upsert(&self, entry: &CacheEntry) -> Result<(), CacheStoreError>;
}

/// SHA-256 of the raw image bytes, hex encoded.
pub fn fingerprint(image_data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image_data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic_sha256() {
        let a = fingerprint(b"food photo");
        assert_eq!(a, fingerprint(b"food photo"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, fingerprint(b"food photo!"));
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
