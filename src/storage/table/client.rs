//! Table service client abstraction
//!
//! The table backend talks to a table service (Azure-Tables-like: entities
//! addressed by partition/row key, versioned by eTag) through these traits.
//! Service SDK adapters implement them; [`super::memory::InMemoryTableService`]
//! is the process-local implementation.

use crate::codec::EncodedPayload;
use crate::types::EntityKey;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Entity as returned by [`TableClient::retrieve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntity {
    pub key: EntityKey,
    pub payload: Vec<u8>,
    pub is_compressed: bool,
    pub etag: String,
    pub timestamp: DateTime<Utc>,
}

/// Failures reported by a table service, by HTTP status
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TableError {
    /// 404 on an entity
    #[error("Entity not found")]
    NotFound,

    /// 409 on insert
    #[error("Entity already exists")]
    Conflict,

    /// 412 on a conditional write
    #[error("Entity eTag does not match")]
    PreconditionFailed,

    /// 404 on the table itself
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Any other service or transport failure
    #[error("Table service returned {status}: {message}")]
    Service { status: u16, message: String },
}

impl TableError {
    pub fn status_code(&self) -> u16 {
        match self {
            TableError::NotFound | TableError::TableNotFound(_) => 404,
            TableError::Conflict => 409,
            TableError::PreconditionFailed => 412,
            TableError::Service { status, .. } => *status,
        }
    }
}

/// Result alias for table client calls
pub type TableResult<T> = std::result::Result<T, TableError>;

/// Handle to one table
///
/// Write operations return the eTag the service allocated for the entity.
#[async_trait]
pub trait TableClient: Send + Sync {
    fn name(&self) -> &str;

    /// Create the table if it does not exist; idempotent
    async fn initialize(&self) -> TableResult<()>;

    async fn retrieve(&self, key: &EntityKey) -> TableResult<Option<TableEntity>>;

    /// Insert; fails with `Conflict` if the entity exists
    async fn insert(&self, key: &EntityKey, payload: &EncodedPayload) -> TableResult<String>;

    /// Insert or replace unconditionally
    async fn insert_or_replace(
        &self,
        key: &EntityKey,
        payload: &EncodedPayload,
    ) -> TableResult<String>;

    /// Replace an existing entity whose eTag equals `if_match`
    async fn replace(
        &self,
        key: &EntityKey,
        payload: &EncodedPayload,
        if_match: &str,
    ) -> TableResult<String>;

    /// Delete an entity whose eTag equals `if_match` (`"*"` matches any)
    async fn delete(&self, key: &EntityKey, if_match: &str) -> TableResult<()>;
}

/// Connection to a table service account
#[async_trait]
pub trait TableService: Send + Sync {
    /// Open a handle to `name`; the table need not exist yet
    async fn open_table(&self, name: &str) -> TableResult<Arc<dyn TableClient>>;
}
