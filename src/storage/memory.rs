//! In-memory bot data storage implementation
//!
//! This module provides a thread-safe, in-memory implementation of the BotDataStore trait
//! using a HashMap protected by an async RwLock.

use crate::error::{StorageError, StorageResult};
use crate::storage::BotDataStore;
use crate::types::{Address, BotData, EntityKey, SaveCondition, StoreType};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RecordKey {
    bot_id: String,
    channel_id: String,
    key: EntityKey,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    etag: String,
    data: Value,
}

/// In-memory bot data storage implementation
///
/// Records live in a HashMap guarded by an async RwLock; every save takes the
/// write lock, so the eTag check and the write happen atomically. Suitable for
/// development, testing, and single-instance deployments.
///
/// # Examples
///
/// ```
/// use botdata::{Address, BotData, InMemoryBotDataStore, StoreType};
/// use botdata::storage::BotDataStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryBotDataStore::new();
///     let address = Address::new("bot", "test").with_user("U1");
///
///     store
///         .save(&address, StoreType::UserData, BotData::wildcard(Some(serde_json::json!({"n": 1}))))
///         .await?;
///
///     let loaded = store.load(&address, StoreType::UserData).await?;
///     assert_eq!(loaded.data, Some(serde_json::json!({"n": 1})));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryBotDataStore {
    records: Arc<RwLock<HashMap<RecordKey, StoredRecord>>>,
}

impl InMemoryBotDataStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the number of records currently stored
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Clear all records from the store
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }

    fn record_key(address: &Address, store_type: StoreType) -> StorageResult<RecordKey> {
        Ok(RecordKey {
            bot_id: address.bot_id.clone(),
            channel_id: address.channel_id.clone(),
            key: EntityKey::derive(address, store_type)?,
        })
    }
}

impl Default for InMemoryBotDataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BotDataStore for InMemoryBotDataStore {
    async fn load(&self, address: &Address, store_type: StoreType) -> StorageResult<BotData> {
        let record_key = Self::record_key(address, store_type)?;
        let records = self.records.read().await;

        debug!(key = %record_key.key, %store_type, "Loading bot data from memory");
        Ok(records
            .get(&record_key)
            .map(|record| BotData::new(record.etag.clone(), Some(record.data.clone())))
            .unwrap_or_default())
    }

    async fn save(
        &self,
        address: &Address,
        store_type: StoreType,
        data: BotData,
    ) -> StorageResult<()> {
        let record_key = Self::record_key(address, store_type)?;
        let condition = data.condition();
        let mut records = self.records.write().await;
        let current = records.get(&record_key).map(|record| record.etag.as_str());

        match &condition {
            SaveCondition::Create if current.is_some() => {
                warn!(key = %record_key.key, "Create rejected, record exists");
                return Err(StorageError::Conflict {
                    key: record_key.key,
                });
            }
            SaveCondition::IfMatch(etag) if current != Some(etag.as_str()) => {
                warn!(key = %record_key.key, "eTag mismatch on save");
                return Err(StorageError::PreconditionFailed {
                    key: record_key.key,
                });
            }
            _ => {}
        }

        debug!(key = %record_key.key, %store_type, ?condition, "Saving bot data to memory");
        match data.into_payload() {
            Some(value) => {
                records.insert(
                    record_key,
                    StoredRecord {
                        etag: Uuid::new_v4().to_string(),
                        data: value,
                    },
                );
            }
            None => {
                records.remove(&record_key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn address() -> Address {
        Address::new("B1", "test")
            .with_conversation("C1")
            .with_user("U1")
    }

    #[tokio::test]
    async fn test_load_missing_record() {
        let store = InMemoryBotDataStore::new();
        let loaded = store
            .load(&address(), StoreType::UserData)
            .await
            .unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_create_then_duplicate_create() {
        let store = InMemoryBotDataStore::new();
        let data = BotData::new("", Some(json!({"n": 1})));

        store
            .save(&address(), StoreType::UserData, data.clone())
            .await
            .unwrap();
        let result = store.save(&address(), StoreType::UserData, data).await;

        assert!(matches!(result, Err(StorageError::Conflict { .. })));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_save_allocates_new_etag() {
        let store = InMemoryBotDataStore::new();
        let address = address();

        store
            .save(&address, StoreType::ConversationData, BotData::wildcard(Some(json!(1))))
            .await
            .unwrap();
        let first = store.load(&address, StoreType::ConversationData).await.unwrap();

        store
            .save(
                &address,
                StoreType::ConversationData,
                BotData::new(first.etag.clone(), Some(json!(2))),
            )
            .await
            .unwrap();
        let second = store.load(&address, StoreType::ConversationData).await.unwrap();

        assert!(!first.etag.is_empty());
        assert_ne!(first.etag, second.etag);
        assert_eq!(second.data, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_stale_etag_rejected() {
        let store = InMemoryBotDataStore::new();
        let address = address();
        store
            .save(&address, StoreType::UserData, BotData::wildcard(Some(json!("a"))))
            .await
            .unwrap();
        let loaded = store.load(&address, StoreType::UserData).await.unwrap();
        store
            .save(&address, StoreType::UserData, BotData::wildcard(Some(json!("b"))))
            .await
            .unwrap();

        let result = store
            .save(&address, StoreType::UserData, BotData::new(loaded.etag, Some(json!("c"))))
            .await;
        assert!(matches!(result, Err(StorageError::PreconditionFailed { .. })));

        let current = store.load(&address, StoreType::UserData).await.unwrap();
        assert_eq!(current.data, Some(json!("b")));
    }

    #[tokio::test]
    async fn test_records_scoped_by_bot_and_channel() {
        let store = InMemoryBotDataStore::new();
        let first = Address::new("bot-a", "slack").with_user("U1");
        let second = Address::new("bot-b", "slack").with_user("U1");

        store
            .save(&first, StoreType::UserData, BotData::wildcard(Some(json!("a"))))
            .await
            .unwrap();

        assert!(store.load(&second, StoreType::UserData).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wildcard_delete_of_missing_record() {
        let store = InMemoryBotDataStore::new();
        store
            .save(&address(), StoreType::UserData, BotData::wildcard(None))
            .await
            .unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = InMemoryBotDataStore::new();
        for store_type in StoreType::ALL {
            store
                .save(&address(), store_type, BotData::wildcard(Some(json!({}))))
                .await
                .unwrap();
        }
        assert_eq!(store.len().await, 3);

        store.clear().await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let store = InMemoryBotDataStore::new();
        let mut handles = Vec::new();

        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let address = Address::new("bot", "test").with_user(format!("U{i}"));
                store
                    .save(&address, StoreType::UserData, BotData::new("", Some(json!(i))))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len().await, 20);
    }
}
