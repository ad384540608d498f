//! # botdata - Conversation-State Stores for Bots
//!
//! botdata persists the per-user, per-conversation and private-conversation
//! state a bot runtime keeps between turns. Every backend implements the same
//! optimistic-concurrency contract, and a bridge lets a live bot move its state
//! from one backend to another without downtime.
//!
//! ## Features
//!
//! - **One contract**: `load` / `save` / `flush` keyed by [`Address`] and [`StoreType`]
//! - **Optimistic concurrency**: eTag-checked saves, `"*"` overwrites, create-only saves
//! - **Backends**: in-memory, table service, SQLite (`sqlite-storage`), Redis (`redis-storage`)
//! - **Live migration**: [`BotDataStoreBridge`] plus the [`BotDataMigrator`] bulk copy job
//! - **Compression**: optional LZ4 payload compression, flagged per record
//!
//! ## Quick Start
//!
//! ```
//! use botdata::{Address, BotData, InMemoryBotDataStore, StorageError, StoreType};
//! use botdata::storage::BotDataStore;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryBotDataStore::new();
//! let address = Address::new("my-bot", "slack")
//!     .with_conversation("C1")
//!     .with_user("U1");
//!
//! // Nothing stored yet: empty eTag, no data
//! let state = store.load(&address, StoreType::PrivateConversationData).await?;
//! assert!(state.is_empty());
//!
//! // Create the record, then update it with the eTag we loaded
//! store
//!     .save(&address, StoreType::PrivateConversationData, BotData::new("", Some(json!({"step": 1}))))
//!     .await?;
//! let state = store.load(&address, StoreType::PrivateConversationData).await?;
//! store
//!     .save(&address, StoreType::PrivateConversationData, BotData::new(state.etag.clone(), Some(json!({"step": 2}))))
//!     .await?;
//!
//! // Saving with the old eTag again is rejected
//! let stale = store
//!     .save(&address, StoreType::PrivateConversationData, BotData::new(state.etag, None))
//!     .await;
//! assert!(matches!(stale, Err(StorageError::PreconditionFailed { .. })));
//! # Ok(())
//! # }
//! ```
//!
//! ## Migrating Between Backends
//!
//! ```
//! use botdata::{Address, BotDataStoreBridge, InMemoryBotDataStore, StoreType};
//! use botdata::storage::BotDataStore;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let old_store = Arc::new(InMemoryBotDataStore::new());
//! let new_store = Arc::new(InMemoryBotDataStore::new());
//! let bridge = BotDataStoreBridge::new(old_store, new_store);
//!
//! // Register `bridge` with the bot runtime; reads fall back to the old
//! // store, writes always land in the new one.
//! let address = Address::new("my-bot", "slack").with_user("U1");
//! let state = bridge.load(&address, StoreType::UserData).await?;
//! bridge.save(&address, StoreType::UserData, state).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`types`]: Address, store types, entity keys and records
//! - [`storage`]: The `BotDataStore` trait and its backends
//! - [`bridge`]: Dual-store migration bridge
//! - [`migration`]: Bulk copy job used alongside the bridge
//! - [`codec`]: Payload serialization and compression
//! - [`config`]: Backend configuration
//! - [`error`]: Error types and result aliases
//!
//! ## License
//!
//! Licensed under either of Apache License 2.0 or MIT license at your option.

// Core type definitions
pub mod types;

// Error types
pub mod error;

// Configuration
pub mod config;

// Payload encoding
pub mod codec;

// Storage backends
pub mod storage;

// Migration bridge
pub mod bridge;

// Bulk migration job
pub mod migration;

pub use bridge::BotDataStoreBridge;
pub use codec::{EncodedPayload, PayloadCodec};
pub use config::{
    BridgeConfig, CodecConfig, MigrationConfig, RedisStoreConfig, SqlStoreConfig, StoreConfig,
    TableStoreConfig,
};
pub use error::{StorageError, StorageResult};
pub use migration::{BotDataMigrator, MigrationReport, RecordOutcome};
pub use storage::memory::InMemoryBotDataStore;
pub use storage::table::{InMemoryTableService, TableBotDataStore};
pub use storage::BotDataStore;
pub use types::*;

#[cfg(feature = "sqlite-storage")]
pub use storage::sql::SqlBotDataStore;

#[cfg(feature = "redis-storage")]
pub use storage::redis::RedisBotDataStore;
