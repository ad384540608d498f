//! Redis bot data storage
//!
//! Each record is a Redis hash holding the encoded payload, its compression
//! flag and the eTag. Saves run as one Lua script so the eTag check and the
//! write are atomic on the server.

use crate::codec::PayloadCodec;
use crate::config::RedisStoreConfig;
use crate::error::{StorageError, StorageResult};
use crate::storage::BotDataStore;
use crate::types::{Address, BotData, EntityKey, SaveCondition, StoreType};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ARGV: mode, expected etag, new etag, data, compressed, delete flag
const SAVE_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'etag')
if ARGV[1] == 'create' then
    if current then return -1 end
elseif ARGV[1] == 'match' then
    if (not current) or current ~= ARGV[2] then return -2 end
end
if ARGV[6] == '1' then
    redis.call('DEL', KEYS[1])
    return 0
end
redis.call('HSET', KEYS[1], 'data', ARGV[4], 'compressed', ARGV[5], 'etag', ARGV[3])
return 1
"#;

const RESULT_CONFLICT: i64 = -1;
const RESULT_PRECONDITION_FAILED: i64 = -2;

/// Bot data store backed by Redis hashes
pub struct RedisBotDataStore {
    connection: ConnectionManager,
    key_prefix: String,
    codec: PayloadCodec,
    save_script: Script,
}

impl RedisBotDataStore {
    pub async fn connect(config: RedisStoreConfig) -> StorageResult<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| StorageError::Configuration(format!("invalid Redis URL: {e}")))?;
        let connection = client.get_connection_manager().await?;
        info!(prefix = %config.key_prefix, "Connected Redis bot data store");
        Ok(Self {
            connection,
            key_prefix: config.key_prefix,
            codec: PayloadCodec::new(config.codec),
            save_script: Script::new(SAVE_SCRIPT),
        })
    }

    /// Redis key holding the record for `address` under `key`
    ///
    /// Each id is written as `<byte length>:<id>`, so ids containing `:`
    /// cannot shift into a neighbouring component.
    pub fn record_key(prefix: &str, address: &Address, key: &EntityKey) -> String {
        let mut record_key = prefix.to_string();
        for part in [
            &address.bot_id,
            &address.channel_id,
            &key.partition_key,
            &key.row_key,
        ] {
            record_key.push_str(&format!(":{}:{}", part.len(), part));
        }
        record_key
    }
}

#[async_trait]
impl BotDataStore for RedisBotDataStore {
    async fn load(&self, address: &Address, store_type: StoreType) -> StorageResult<BotData> {
        let key = EntityKey::derive(address, store_type)?;
        let record_key = Self::record_key(&self.key_prefix, address, &key);
        debug!(key = %record_key, %store_type, "Loading bot data from Redis");

        let mut conn = self.connection.clone();
        let (data, compressed, etag): (Option<Vec<u8>>, Option<String>, Option<String>) =
            redis::cmd("HMGET")
                .arg(&record_key)
                .arg("data")
                .arg("compressed")
                .arg("etag")
                .query_async(&mut conn)
                .await?;

        match (data, etag) {
            (Some(bytes), Some(etag)) => {
                let is_compressed = compressed.as_deref() == Some("1");
                let value = self.codec.decode(&bytes, is_compressed)?;
                Ok(BotData::new(etag, Some(value)))
            }
            _ => Ok(BotData::empty()),
        }
    }

    async fn save(
        &self,
        address: &Address,
        store_type: StoreType,
        data: BotData,
    ) -> StorageResult<()> {
        let key = EntityKey::derive(address, store_type)?;
        let record_key = Self::record_key(&self.key_prefix, address, &key);
        let condition = data.condition();
        debug!(key = %record_key, %store_type, ?condition, "Saving bot data to Redis");

        let Some(value) = data.into_payload() else {
            if condition == SaveCondition::Create {
                return Ok(());
            }
            return self.run_save(&key, &record_key, &condition, None).await;
        };
        let payload = self.codec.encode(&value)?;
        self.run_save(
            &key,
            &record_key,
            &condition,
            Some((payload.bytes, payload.is_compressed)),
        )
        .await
    }
}

impl RedisBotDataStore {
    async fn run_save(
        &self,
        key: &EntityKey,
        record_key: &str,
        condition: &SaveCondition,
        payload: Option<(Vec<u8>, bool)>,
    ) -> StorageResult<()> {
        let (mode, expected) = match condition {
            SaveCondition::Create => ("create", ""),
            SaveCondition::Overwrite => ("overwrite", ""),
            SaveCondition::IfMatch(etag) => ("match", etag.as_str()),
        };
        let delete = payload.is_none();
        let (bytes, compressed) = payload.unwrap_or_default();

        let mut conn = self.connection.clone();
        let result: i64 = self
            .save_script
            .key(record_key)
            .arg(mode)
            .arg(expected)
            .arg(Uuid::new_v4().to_string())
            .arg(bytes)
            .arg(if compressed { "1" } else { "0" })
            .arg(if delete { "1" } else { "0" })
            .invoke_async(&mut conn)
            .await?;

        match result {
            RESULT_CONFLICT => {
                warn!(key = %record_key, "Create rejected, record exists");
                Err(StorageError::Conflict { key: key.clone() })
            }
            RESULT_PRECONDITION_FAILED => {
                warn!(key = %record_key, "eTag mismatch on save");
                Err(StorageError::PreconditionFailed { key: key.clone() })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> RedisBotDataStore {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
        let prefix = format!("botdata-test-{}", Uuid::new_v4().simple());
        RedisBotDataStore::connect(RedisStoreConfig::new(url).with_key_prefix(prefix))
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore = "requires a Redis server at REDIS_URL"]
    async fn test_redis_optimistic_concurrency() {
        let store = store().await;
        let address = Address::new("B1", "test").with_conversation("C1").with_user("U1");
        let store_type = StoreType::PrivateConversationData;

        assert!(store.load(&address, store_type).await.unwrap().is_empty());
        store
            .save(&address, store_type, BotData::new("", Some(json!({"Value": 5}))))
            .await
            .unwrap();
        let first = store.load(&address, store_type).await.unwrap();

        let conflict = store
            .save(&address, store_type, BotData::new("", Some(json!({"Value": 0}))))
            .await;
        assert!(matches!(conflict, Err(StorageError::Conflict { .. })));

        store
            .save(
                &address,
                store_type,
                BotData::new(first.etag.clone(), Some(json!({"Value": 6}))),
            )
            .await
            .unwrap();
        let stale = store
            .save(&address, store_type, BotData::new(first.etag, None))
            .await;
        assert!(matches!(stale, Err(StorageError::PreconditionFailed { .. })));

        store
            .save(&address, store_type, BotData::wildcard(None))
            .await
            .unwrap();
        assert!(store.load(&address, store_type).await.unwrap().is_empty());
    }

    #[test]
    fn test_record_key_layout() {
        let address = Address::new("B1", "test").with_user("U1");
        let key = EntityKey::derive(&address, StoreType::UserData).unwrap();
        assert_eq!(
            RedisBotDataStore::record_key("botdata", &address, &key),
            "botdata:2:B1:4:test:2:U1:4:user"
        );
    }

    #[test]
    fn test_record_key_ids_containing_separator() {
        let key = EntityKey::new("U1", "user");
        let bot_with_colon = Address::new("a:b", "c");
        let channel_with_colon = Address::new("a", "b:c");
        assert_ne!(
            RedisBotDataStore::record_key("botdata", &bot_with_colon, &key),
            RedisBotDataStore::record_key("botdata", &channel_with_colon, &key)
        );

        let address = Address::new("B1", "msteams");
        let split_early = EntityKey::new("19:x", "29:y");
        let split_late = EntityKey::new("19:x:29", "y");
        assert_ne!(
            RedisBotDataStore::record_key("botdata", &address, &split_early),
            RedisBotDataStore::record_key("botdata", &address, &split_late)
        );
    }
}
