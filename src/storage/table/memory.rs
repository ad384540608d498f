//! In-memory table service
//!
//! Emulates the table-service semantics the table backend relies on: tables
//! must be created before use, writes allocate fresh eTags, and conditional
//! operations are checked atomically under one lock.

use super::client::{TableClient, TableEntity, TableError, TableResult, TableService};
use crate::codec::EncodedPayload;
use crate::types::EntityKey;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

type Tables = HashMap<String, HashMap<EntityKey, TableEntity>>;

#[derive(Debug, Default)]
struct ServiceState {
    tables: RwLock<Tables>,
    create_calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl ServiceState {
    fn check_available(&self) -> TableResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TableError::Service {
                status: 503,
                message: "Service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Table service kept entirely in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryTableService {
    state: Arc<ServiceState>,
}

impl InMemoryTableService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the tables created so far, sorted
    pub async fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.tables.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of entities in `table`, if it exists
    pub async fn entity_count(&self, table: &str) -> Option<usize> {
        self.state.tables.read().await.get(table).map(HashMap::len)
    }

    /// Number of `initialize` calls received across all tables
    pub fn create_calls(&self) -> usize {
        self.state.create_calls.load(Ordering::SeqCst)
    }

    /// Make every call fail with 503 until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl TableService for InMemoryTableService {
    async fn open_table(&self, name: &str) -> TableResult<Arc<dyn TableClient>> {
        self.state.check_available()?;
        Ok(Arc::new(InMemoryTable {
            name: name.to_string(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct InMemoryTable {
    name: String,
    state: Arc<ServiceState>,
}

impl InMemoryTable {
    fn entity(key: &EntityKey, payload: &EncodedPayload) -> TableEntity {
        TableEntity {
            key: key.clone(),
            payload: payload.bytes.clone(),
            is_compressed: payload.is_compressed,
            etag: format!("W/\"{}\"", Uuid::new_v4().simple()),
            timestamp: Utc::now(),
        }
    }

    fn rows<'a>(
        &self,
        tables: &'a mut Tables,
    ) -> TableResult<&'a mut HashMap<EntityKey, TableEntity>> {
        tables
            .get_mut(&self.name)
            .ok_or_else(|| TableError::TableNotFound(self.name.clone()))
    }
}

#[async_trait]
impl TableClient for InMemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> TableResult<()> {
        self.state.check_available()?;
        self.state.create_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .tables
            .write()
            .await
            .entry(self.name.clone())
            .or_default();
        Ok(())
    }

    async fn retrieve(&self, key: &EntityKey) -> TableResult<Option<TableEntity>> {
        self.state.check_available()?;
        let tables = self.state.tables.read().await;
        let rows = tables
            .get(&self.name)
            .ok_or_else(|| TableError::TableNotFound(self.name.clone()))?;
        Ok(rows.get(key).cloned())
    }

    async fn insert(&self, key: &EntityKey, payload: &EncodedPayload) -> TableResult<String> {
        self.state.check_available()?;
        let mut tables = self.state.tables.write().await;
        let rows = self.rows(&mut tables)?;
        if rows.contains_key(key) {
            return Err(TableError::Conflict);
        }
        let entity = Self::entity(key, payload);
        let etag = entity.etag.clone();
        rows.insert(key.clone(), entity);
        Ok(etag)
    }

    async fn insert_or_replace(
        &self,
        key: &EntityKey,
        payload: &EncodedPayload,
    ) -> TableResult<String> {
        self.state.check_available()?;
        let mut tables = self.state.tables.write().await;
        let rows = self.rows(&mut tables)?;
        let entity = Self::entity(key, payload);
        let etag = entity.etag.clone();
        rows.insert(key.clone(), entity);
        Ok(etag)
    }

    async fn replace(
        &self,
        key: &EntityKey,
        payload: &EncodedPayload,
        if_match: &str,
    ) -> TableResult<String> {
        self.state.check_available()?;
        let mut tables = self.state.tables.write().await;
        let rows = self.rows(&mut tables)?;
        let current = rows.get(key).ok_or(TableError::NotFound)?;
        if if_match != "*" && current.etag != if_match {
            return Err(TableError::PreconditionFailed);
        }
        let entity = Self::entity(key, payload);
        let etag = entity.etag.clone();
        rows.insert(key.clone(), entity);
        Ok(etag)
    }

    async fn delete(&self, key: &EntityKey, if_match: &str) -> TableResult<()> {
        self.state.check_available()?;
        let mut tables = self.state.tables.write().await;
        let rows = self.rows(&mut tables)?;
        let current = rows.get(key).ok_or(TableError::NotFound)?;
        if if_match != "*" && current.etag != if_match {
            return Err(TableError::PreconditionFailed);
        }
        rows.remove(key);
        Ok(())
    }
}
