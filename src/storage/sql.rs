//! SQL bot data storage
//!
//! Implements `BotDataStore` on SQLite through sqlx. Every write is a single
//! compare-and-swap statement inside its own transaction; the affected-row
//! count decides between success and a concurrency error, so correctness
//! does not depend on the transaction isolation level.

use crate::codec::PayloadCodec;
use crate::config::SqlStoreConfig;
use crate::error::{StorageError, StorageResult};
use crate::storage::BotDataStore;
use crate::types::{Address, BotData, EntityKey, SaveCondition, StoreType};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info, warn};
use uuid::Uuid;

const KEY_FILTER: &str = "bot_id = ? AND channel_id = ? AND partition_key = ? AND row_key = ?";

/// Statement text for one configured table
struct Statements {
    create_table: String,
    select: String,
    insert: String,
    upsert: String,
    update_if_match: String,
    delete: String,
    delete_if_match: String,
}

impl Statements {
    fn new(table: &str) -> Self {
        let columns = "bot_id, channel_id, partition_key, row_key, service_url, data, is_compressed, etag, updated_at";
        let values = "?, ?, ?, ?, ?, ?, ?, ?, ?";
        Self {
            create_table: format!(
                r#"CREATE TABLE IF NOT EXISTS {table} (
                    bot_id TEXT NOT NULL,
                    channel_id TEXT NOT NULL,
                    partition_key TEXT NOT NULL,
                    row_key TEXT NOT NULL,
                    service_url TEXT NOT NULL DEFAULT '',
                    data BLOB NOT NULL,
                    is_compressed INTEGER NOT NULL DEFAULT 0,
                    etag TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (bot_id, channel_id, partition_key, row_key)
                )"#
            ),
            select: format!("SELECT data, is_compressed, etag FROM {table} WHERE {KEY_FILTER}"),
            insert: format!(
                "INSERT INTO {table} ({columns}) VALUES ({values}) \
                 ON CONFLICT (bot_id, channel_id, partition_key, row_key) DO NOTHING"
            ),
            upsert: format!(
                "INSERT INTO {table} ({columns}) VALUES ({values}) \
                 ON CONFLICT (bot_id, channel_id, partition_key, row_key) DO UPDATE SET \
                 service_url = excluded.service_url, data = excluded.data, \
                 is_compressed = excluded.is_compressed, etag = excluded.etag, \
                 updated_at = excluded.updated_at"
            ),
            update_if_match: format!(
                "UPDATE {table} SET service_url = ?, data = ?, is_compressed = ?, etag = ?, \
                 updated_at = ? WHERE {KEY_FILTER} AND etag = ?"
            ),
            delete: format!("DELETE FROM {table} WHERE {KEY_FILTER}"),
            delete_if_match: format!("DELETE FROM {table} WHERE {KEY_FILTER} AND etag = ?"),
        }
    }
}

/// Bot data store backed by a SQL table
pub struct SqlBotDataStore {
    pool: SqlitePool,
    table_name: String,
    statements: Statements,
    codec: PayloadCodec,
}

impl SqlBotDataStore {
    /// Open a pool for `config.url` and prepare the schema
    pub async fn connect(config: SqlStoreConfig) -> StorageResult<Self> {
        config.validate()?;
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        Self::with_pool(pool, config).await
    }

    /// Use an existing pool
    ///
    /// Creates the table when `create_schema` is set, otherwise fails with
    /// [`StorageError::SchemaMissing`] if it does not exist.
    pub async fn with_pool(pool: SqlitePool, config: SqlStoreConfig) -> StorageResult<Self> {
        config.validate()?;
        let store = Self {
            pool,
            statements: Statements::new(&config.table_name),
            table_name: config.table_name,
            codec: PayloadCodec::new(config.codec),
        };
        if config.create_schema {
            store.create_schema().await?;
        } else {
            store.verify_schema().await?;
        }
        Ok(store)
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn create_schema(&self) -> StorageResult<()> {
        sqlx::query(&self.statements.create_table)
            .execute(&self.pool)
            .await?;
        info!(table = %self.table_name, "Ensured bot data table exists");
        Ok(())
    }

    /// Check that the configured table exists
    pub async fn verify_schema(&self) -> StorageResult<()> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(&self.table_name)
                .fetch_optional(&self.pool)
                .await?;
        if found.is_none() {
            return Err(StorageError::SchemaMissing(format!(
                "table {} does not exist",
                self.table_name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BotDataStore for SqlBotDataStore {
    async fn load(&self, address: &Address, store_type: StoreType) -> StorageResult<BotData> {
        let key = EntityKey::derive(address, store_type)?;
        debug!(table = %self.table_name, %key, %store_type, "Loading bot data from SQL");

        let row = sqlx::query(&self.statements.select)
            .bind(&address.bot_id)
            .bind(&address.channel_id)
            .bind(&key.partition_key)
            .bind(&key.row_key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let bytes: Vec<u8> = row.try_get("data")?;
                let is_compressed: bool = row.try_get("is_compressed")?;
                let etag: String = row.try_get("etag")?;
                let value = self.codec.decode(&bytes, is_compressed)?;
                Ok(BotData::new(etag, Some(value)))
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
        let condition = data.condition();
        debug!(table = %self.table_name, %key, %store_type, ?condition, "Saving bot data to SQL");

        let payload = data.payload().map(|v| self.codec.encode(v)).transpose()?;
        let etag = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;
        let affected = match (&condition, payload) {
            (SaveCondition::Create, None) => None,
            (SaveCondition::Create, Some(payload)) => Some(
                sqlx::query(&self.statements.insert)
                    .bind(&address.bot_id)
                    .bind(&address.channel_id)
                    .bind(&key.partition_key)
                    .bind(&key.row_key)
                    .bind(&address.service_url)
                    .bind(payload.bytes)
                    .bind(payload.is_compressed)
                    .bind(&etag)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected(),
            ),
            (SaveCondition::Overwrite, Some(payload)) => {
                sqlx::query(&self.statements.upsert)
                    .bind(&address.bot_id)
                    .bind(&address.channel_id)
                    .bind(&key.partition_key)
                    .bind(&key.row_key)
                    .bind(&address.service_url)
                    .bind(payload.bytes)
                    .bind(payload.is_compressed)
                    .bind(&etag)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await?;
                None
            }
            (SaveCondition::Overwrite, None) => {
                sqlx::query(&self.statements.delete)
                    .bind(&address.bot_id)
                    .bind(&address.channel_id)
                    .bind(&key.partition_key)
                    .bind(&key.row_key)
                    .execute(&mut *tx)
                    .await?;
                None
            }
            (SaveCondition::IfMatch(expected), Some(payload)) => Some(
                sqlx::query(&self.statements.update_if_match)
                    .bind(&address.service_url)
                    .bind(payload.bytes)
                    .bind(payload.is_compressed)
                    .bind(&etag)
                    .bind(&now)
                    .bind(&address.bot_id)
                    .bind(&address.channel_id)
                    .bind(&key.partition_key)
                    .bind(&key.row_key)
                    .bind(expected)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected(),
            ),
            (SaveCondition::IfMatch(expected), None) => Some(
                sqlx::query(&self.statements.delete_if_match)
                    .bind(&address.bot_id)
                    .bind(&address.channel_id)
                    .bind(&key.partition_key)
                    .bind(&key.row_key)
                    .bind(expected)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected(),
            ),
        };

        if affected == Some(0) {
            tx.rollback().await?;
            warn!(table = %self.table_name, %key, ?condition, "Concurrent update rejected");
            return Err(match condition {
                SaveCondition::Create => StorageError::Conflict { key },
                _ => StorageError::PreconditionFailed { key },
            });
        }

        tx.commit().await?;
        Ok(())
    }
}
