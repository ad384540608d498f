//! Store configuration
//!
//! Every backend is configured with a serde-deserializable struct so the
//! settings can come from a config file, the environment, or code.

use crate::bridge::BotDataStoreBridge;
use crate::error::{StorageError, StorageResult};
use crate::storage::memory::InMemoryBotDataStore;
use crate::storage::BotDataStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Environment variable selecting the backend (`memory`, `sqlite`, `redis`)
pub const ENV_STORE: &str = "BOTDATA_STORE";
/// Environment variable holding the SQL connection URL
pub const ENV_SQL_URL: &str = "BOTDATA_SQL_URL";
/// Environment variable holding the Redis connection URL
pub const ENV_REDIS_URL: &str = "BOTDATA_REDIS_URL";

fn default_compression_threshold() -> usize {
    1024
}

fn default_table_name() -> String {
    "bot_data".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_create_schema() -> bool {
    true
}

fn default_key_prefix() -> String {
    "botdata".to_string()
}

fn default_concurrency() -> usize {
    8
}

/// Payload encoding settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Compress payloads at or above the threshold
    #[serde(default)]
    pub compress: bool,
    /// Minimum serialized size in bytes before compression kicks in
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            compress: false,
            compression_threshold: default_compression_threshold(),
        }
    }
}

impl CodecConfig {
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_compression_threshold(mut self, threshold: usize) -> Self {
        self.compression_threshold = threshold;
        self
    }
}

/// Configuration for the table-service backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStoreConfig {
    #[serde(default)]
    pub codec: CodecConfig,
}

impl TableStoreConfig {
    pub fn with_codec(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }
}

/// Configuration for the relational backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlStoreConfig {
    /// Connection URL, e.g. `sqlite://bot.db?mode=rwc`
    pub url: String,
    #[serde(default = "default_table_name")]
    pub table_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Create the table on connect instead of only checking for it
    #[serde(default = "default_create_schema")]
    pub create_schema: bool,
    #[serde(default)]
    pub codec: CodecConfig,
}

impl SqlStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            table_name: default_table_name(),
            max_connections: default_max_connections(),
            create_schema: default_create_schema(),
            codec: CodecConfig::default(),
        }
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn with_create_schema(mut self, create_schema: bool) -> Self {
        self.create_schema = create_schema;
        self
    }

    pub fn with_codec(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }

    /// Check the settings that end up inside SQL text
    pub fn validate(&self) -> StorageResult<()> {
        if self.url.is_empty() {
            return Err(StorageError::Configuration(
                "SQL connection URL is required".to_string(),
            ));
        }
        let mut chars = self.table_name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StorageError::Configuration(format!(
                "invalid table name: {:?}",
                self.table_name
            )));
        }
        Ok(())
    }
}

/// Configuration for the Redis document-store backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisStoreConfig {
    pub url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default)]
    pub codec: CodecConfig,
}

impl RedisStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: default_key_prefix(),
            codec: CodecConfig::default(),
        }
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    pub fn with_codec(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }
}

/// Settings for the bulk migration job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Maximum number of records copied at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl MigrationConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

/// Which backend to connect to
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    #[default]
    Memory,
    Sqlite(SqlStoreConfig),
    Redis(RedisStoreConfig),
}

impl StoreConfig {
    /// Load the backend selection from `BOTDATA_*` environment variables
    pub fn from_env() -> StorageResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`StoreConfig::from_env`], reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> StorageResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = lookup(ENV_STORE).unwrap_or_else(|| "memory".to_string());
        let required = |name: &str| {
            lookup(name).filter(|v| !v.is_empty()).ok_or_else(|| {
                StorageError::Configuration(format!(
                    "{name} environment variable not set for {backend} backend"
                ))
            })
        };
        match backend.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreConfig::Memory),
            "sqlite" => Ok(StoreConfig::Sqlite(SqlStoreConfig::new(required(
                ENV_SQL_URL,
            )?))),
            "redis" => Ok(StoreConfig::Redis(RedisStoreConfig::new(required(
                ENV_REDIS_URL,
            )?))),
            other => Err(StorageError::Configuration(format!(
                "unknown store backend: {other}"
            ))),
        }
    }

    /// Short backend name, used in logs
    pub fn backend_name(&self) -> &'static str {
        match self {
            StoreConfig::Memory => "memory",
            StoreConfig::Sqlite(_) => "sqlite",
            StoreConfig::Redis(_) => "redis",
        }
    }

    /// Connect to the configured backend
    pub async fn connect(&self) -> StorageResult<Arc<dyn BotDataStore>> {
        info!(backend = self.backend_name(), "Connecting bot data store");
        match self {
            StoreConfig::Memory => Ok(Arc::new(InMemoryBotDataStore::new())),
            #[cfg(feature = "sqlite-storage")]
            StoreConfig::Sqlite(config) => Ok(Arc::new(
                crate::storage::sql::SqlBotDataStore::connect(config.clone()).await?,
            )),
            #[cfg(feature = "redis-storage")]
            StoreConfig::Redis(config) => Ok(Arc::new(
                crate::storage::redis::RedisBotDataStore::connect(config.clone()).await?,
            )),
            #[allow(unreachable_patterns)]
            other => Err(StorageError::Configuration(format!(
                "botdata was built without the {} backend",
                other.backend_name()
            ))),
        }
    }
}

/// A pair of stores wired into a migration bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Store being migrated away from; only read
    pub source: StoreConfig,
    /// Store receiving all writes
    pub target: StoreConfig,
}

impl BridgeConfig {
    pub async fn connect(&self) -> StorageResult<BotDataStoreBridge> {
        let source = self.source.connect().await?;
        let target = self.target.connect().await?;
        Ok(BotDataStoreBridge::new(source, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_codec_config() {
        let config = CodecConfig::default();
        assert!(!config.compress);
        assert_eq!(config.compression_threshold, 1024);
    }

    #[test]
    fn test_sql_config_defaults_from_json() {
        let config: SqlStoreConfig =
            serde_json::from_str(r#"{"url": "sqlite::memory:"}"#).unwrap();
        assert_eq!(config.table_name, "bot_data");
        assert_eq!(config.max_connections, 5);
        assert!(config.create_schema);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sql_config_rejects_bad_table_name() {
        for name in ["", "1data", "bot-data", "bot_data; DROP TABLE x"] {
            let config = SqlStoreConfig::new("sqlite::memory:").with_table_name(name);
            assert!(
                matches!(config.validate(), Err(StorageError::Configuration(_))),
                "{name:?} should be rejected"
            );
        }
        let config = SqlStoreConfig::new("sqlite::memory:").with_table_name("_bot_data2");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tagged_store_config() {
        let config: StoreConfig = serde_json::from_str(
            r#"{"backend": "redis", "url": "redis://localhost", "key_prefix": "bots"}"#,
        )
        .unwrap();
        match config {
            StoreConfig::Redis(redis) => {
                assert_eq!(redis.url, "redis://localhost");
                assert_eq!(redis.key_prefix, "bots");
            }
            other => panic!("unexpected config: {other:?}"),
        }

        let memory: StoreConfig = serde_json::from_str(r#"{"backend": "memory"}"#).unwrap();
        assert_eq!(memory, StoreConfig::Memory);
    }

    #[test]
    fn test_from_lookup() {
        assert_eq!(StoreConfig::from_lookup(lookup(&[])).unwrap(), StoreConfig::Memory);

        let config = StoreConfig::from_lookup(lookup(&[
            (ENV_STORE, "sqlite"),
            (ENV_SQL_URL, "sqlite://bot.db"),
        ]))
        .unwrap();
        assert_eq!(config, StoreConfig::Sqlite(SqlStoreConfig::new("sqlite://bot.db")));

        let missing = StoreConfig::from_lookup(lookup(&[(ENV_STORE, "redis")]));
        assert!(matches!(missing, Err(StorageError::Configuration(_))));

        let unknown = StoreConfig::from_lookup(lookup(&[(ENV_STORE, "cosmos")]));
        assert!(matches!(unknown, Err(StorageError::Configuration(_))));
    }

    #[test]
    fn test_migration_concurrency_floor() {
        assert_eq!(MigrationConfig::default().with_concurrency(0).concurrency, 1);
    }

    #[tokio::test]
    async fn test_connect_memory() {
        let store = StoreConfig::Memory.connect().await.unwrap();
        assert!(store.flush(&crate::types::Address::new("b", "c")).await.unwrap());
    }
}
