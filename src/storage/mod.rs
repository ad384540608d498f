//! Bot data storage backends
//!
//! This module provides the trait every conversation-state backend
//! implements, allowing the bot runtime to switch between in-memory, table
//! service, SQL and Redis storage without code changes.

use crate::error::StorageResult;
use crate::types::{Address, BotData, StoreType};
use async_trait::async_trait;

pub mod memory;
pub mod table;

#[cfg(feature = "sqlite-storage")]
pub mod sql;

#[cfg(feature = "redis-storage")]
pub mod redis;

/// Trait for bot data storage backends
///
/// Records are addressed by an [`Address`] and a [`StoreType`], and versioned
/// with an eTag. The eTag supplied to [`BotDataStore::save`] selects the write
/// mode:
///
/// * `""` creates the record and fails with `Conflict` if one exists
/// * `"*"` overwrites (or, with `data == None`, deletes) unconditionally
/// * anything else must equal the stored eTag or the save fails with
///   `PreconditionFailed` and nothing is written
#[async_trait]
pub trait BotDataStore: Send + Sync {
    /// Load the record at `address`
    ///
    /// # Returns
    ///
    /// The stored record, or [`BotData::empty`] when nothing is stored
    async fn load(&self, address: &Address, store_type: StoreType) -> StorageResult<BotData>;

    /// Save `data` at `address`, honouring the optimistic-concurrency eTag
    async fn save(
        &self,
        address: &Address,
        store_type: StoreType,
        data: BotData,
    ) -> StorageResult<()>;

    /// Commit any writes buffered for `address`
    ///
    /// Backends that write synchronously in `save` have nothing to flush and
    /// return `true`.
    async fn flush(&self, _address: &Address) -> StorageResult<bool> {
        Ok(true)
    }
}
