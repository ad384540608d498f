//! Table-service bot data storage
//!
//! Records are spread over one table per (bot, channel) pair to keep hot
//! partitions apart. Tables are created lazily on first use and their handles
//! cached in a [`TableRegistry`] owned by the store.

use crate::codec::PayloadCodec;
use crate::config::TableStoreConfig;
use crate::error::{StorageError, StorageResult};
use crate::storage::BotDataStore;
use crate::types::{Address, BotData, EntityKey, SaveCondition, StoreType, WILDCARD_ETAG};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub mod client;
pub mod memory;
pub mod registry;

pub use client::{TableClient, TableEntity, TableError, TableResult, TableService};
pub use memory::InMemoryTableService;
pub use registry::TableRegistry;

/// Bot data store backed by a table service
pub struct TableBotDataStore {
    registry: TableRegistry,
    codec: PayloadCodec,
}

impl TableBotDataStore {
    pub fn new(service: Arc<dyn TableService>, config: TableStoreConfig) -> Self {
        Self {
            registry: TableRegistry::new(service),
            codec: PayloadCodec::new(config.codec),
        }
    }

    /// Physical table holding the records of `address`'s bot and channel
    ///
    /// The name is a UUID v5 over both ids, so it is stable, collision-free
    /// and always a legal table name.
    pub fn table_name(address: &Address) -> String {
        let scope = format!(
            "{}:{}:{}",
            address.bot_id.len(),
            address.bot_id,
            address.channel_id
        );
        let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, scope.as_bytes());
        format!("bd{}", id.simple())
    }

    /// Cached table handles
    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    async fn table(&self, address: &Address) -> StorageResult<Arc<dyn TableClient>> {
        self.registry.get_or_create(&Self::table_name(address)).await
    }
}

fn map_table_error(err: TableError, key: &EntityKey) -> StorageError {
    match err {
        TableError::Conflict => StorageError::Conflict { key: key.clone() },
        TableError::PreconditionFailed => StorageError::PreconditionFailed { key: key.clone() },
        other => StorageError::Transport {
            backend: "table",
            message: format!("{key}: {other} (status {})", other.status_code()),
        },
    }
}

/// Conditional writes against an entity that is gone also fail the precondition
fn map_conditional_error(err: TableError, key: &EntityKey) -> StorageError {
    match err {
        TableError::NotFound => StorageError::PreconditionFailed { key: key.clone() },
        other => map_table_error(other, key),
    }
}

#[async_trait]
impl BotDataStore for TableBotDataStore {
    async fn load(&self, address: &Address, store_type: StoreType) -> StorageResult<BotData> {
        let key = EntityKey::derive(address, store_type)?;
        let table = self.table(address).await?;

        debug!(table = table.name(), %key, %store_type, "Loading bot data from table");
        let entity = table
            .retrieve(&key)
            .await
            .map_err(|e| map_table_error(e, &key))?;

        match entity {
            Some(entity) => {
                let value = self.codec.decode(&entity.payload, entity.is_compressed)?;
                Ok(BotData::new(entity.etag, Some(value)))
            }
            None => Ok(BotData::empty()),
        }
    }

    async fn save(
        &self,
        address: &Address,
        store_type: StoreType,
        data: BotData,
    ) -> StorageResult<()> {
        let key = EntityKey::derive(address, store_type)?;
        let table = self.table(address).await?;
        let condition = data.condition();

        debug!(table = table.name(), %key, %store_type, ?condition, "Saving bot data to table");
        let result = match (condition, data.into_payload()) {
            (SaveCondition::Create, Some(value)) => {
                let payload = self.codec.encode(&value)?;
                table
                    .insert(&key, &payload)
                    .await
                    .map(drop)
                    .map_err(|e| map_table_error(e, &key))
            }
            (SaveCondition::Create, None) => Ok(()),
            (SaveCondition::Overwrite, Some(value)) => {
                let payload = self.codec.encode(&value)?;
                table
                    .insert_or_replace(&key, &payload)
                    .await
                    .map(drop)
                    .map_err(|e| map_table_error(e, &key))
            }
            (SaveCondition::Overwrite, None) => match table.delete(&key, WILDCARD_ETAG).await {
                Ok(()) | Err(TableError::NotFound) => Ok(()),
                Err(e) => Err(map_table_error(e, &key)),
            },
            (SaveCondition::IfMatch(etag), Some(value)) => {
                let payload = self.codec.encode(&value)?;
                table
                    .replace(&key, &payload, &etag)
                    .await
                    .map(drop)
                    .map_err(|e| map_conditional_error(e, &key))
            }
            (SaveCondition::IfMatch(etag), None) => table
                .delete(&key, &etag)
                .await
                .map_err(|e| map_conditional_error(e, &key)),
        };

        if let Err(err) = &result {
            if err.is_concurrency_conflict() {
                warn!(table = table.name(), %key, "Concurrent update rejected: {}", err);
            }
        }
        result
    }
}
