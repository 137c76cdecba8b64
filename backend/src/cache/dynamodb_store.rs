use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::models::CacheEntry;
use super::{CacheStore, CacheStoreError};

/// Prediction cache table keyed by `image_hash`.
#[derive(Clone)]
pub struct DynamoDbCacheStore {
    client: Client,
    table: String,
}

impl DynamoDbCacheStore {
    pub fn new(client: Client, table: String) -> Self {
        Self { client, table }
    }

    fn entry_to_item(entry: &CacheEntry) -> HashMap<String, AttributeValue> {
        let mut item = HashMap::new();
        item.insert(
            "image_hash".to_string(),
            AttributeValue::S(entry.key.clone()),
        );
        item.insert(
            "payload".to_string(),
            AttributeValue::S(entry.payload.clone()),
        );
        item.insert(
            "created_at".to_string(),
            AttributeValue::S(entry.created_at.to_rfc3339()),
        );
        item
    }

    fn parse_entry_from_item(
        item: HashMap<String, AttributeValue>,
    ) -> Result<CacheEntry, CacheStoreError> {
        let key = item
            .get("image_hash")
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| CacheStoreError::InvalidData("Invalid image_hash".to_string()))?
            .clone();

        let payload = item
            .get("payload")
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| CacheStoreError::InvalidData("Invalid payload".to_string()))?
            .clone();

        let created_at = item
            .get("created_at")
            .and_then(|v| v.as_s().ok())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| CacheStoreError::InvalidData("Invalid created_at".to_string()))?;

        Ok(CacheEntry {
            key,
            payload,
            created_at,
        })
    }
}

#[async_trait]
impl CacheStore for DynamoDbCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("image_hash", AttributeValue::S(key.to_string()))
            .send()
            .await
            .map_err(|e| {
                log::error!("DynamoDB get_item failed for {}: {:?}", key, e);
                CacheStoreError::DynamoDb(e.to_string())
            })?;

        match result.item {
            Some(item) => Ok(Some(Self::parse_entry_from_item(item)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, entry: &CacheEntry) -> Result<(), CacheStoreError> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(Self::entry_to_item(entry)))
            .send()
            .await
            .map_err(|e| {
                log::error!("DynamoDB put_item failed for {}: {:?}", entry.key, e);
                CacheStoreError::DynamoDb(e.to_string())
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_conversion_round_trips() {
        let entry = CacheEntry::new("deadbeef".into(), "{\"success\":true}".into());
        let parsed = DynamoDbCacheStore::parse_entry_from_item(
            DynamoDbCacheStore::entry_to_item(&entry),
        )
        .unwrap();
        assert_eq!(parsed.key, entry.key);
        assert_eq!(parsed.payload, entry.payload);
        assert_eq!(parsed.created_at.timestamp(), entry.created_at.timestamp());
    }

    #[test]
    fn missing_attributes_are_invalid_data() {
        let mut item = HashMap::new();
        item.insert("image_hash".to_string(), AttributeValue::S("k".into()));
        assert!(matches!(
            DynamoDbCacheStore::parse_entry_from_item(item),
            Err(CacheStoreError::InvalidData(_))
        ));
    }
}
