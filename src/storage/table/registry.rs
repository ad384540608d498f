//! Cache of initialized table handles
//!
//! Opening a table runs its create-if-not-exists call, which must happen at
//! most once per table name for the lifetime of the owning store. A single
//! mutex guards the whole lookup-or-create step.

use super::client::{TableClient, TableService};
use crate::error::{StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub struct TableRegistry {
    service: Arc<dyn TableService>,
    tables: Mutex<HashMap<String, Arc<dyn TableClient>>>,
}

impl TableRegistry {
    pub fn new(service: Arc<dyn TableService>) -> Self {
        Self {
            service,
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Return the handle for `name`, creating the table on first use
    pub async fn get_or_create(&self, name: &str) -> StorageResult<Arc<dyn TableClient>> {
        let mut tables = self.tables.lock().await;
        if let Some(table) = tables.get(name) {
            return Ok(Arc::clone(table));
        }

        let table = self
            .service
            .open_table(name)
            .await
            .map_err(|e| StorageError::transport("table", e))?;
        table
            .initialize()
            .await
            .map_err(|e| StorageError::transport("table", e))?;
        info!(table = name, "Initialized bot data table");

        tables.insert(name.to_string(), Arc::clone(&table));
        Ok(table)
    }

    /// Number of cached handles
    pub async fn len(&self) -> usize {
        self.tables.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tables.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::table::memory::InMemoryTableService;

    #[tokio::test]
    async fn test_table_created_once() {
        let service = InMemoryTableService::new();
        let registry = Arc::new(TableRegistry::new(Arc::new(service.clone())));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.get_or_create("bdshared").await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(service.create_calls(), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_creation_not_cached() {
        let service = InMemoryTableService::new();
        let registry = TableRegistry::new(Arc::new(service.clone()));

        service.set_unavailable(true);
        let result = registry.get_or_create("bdflaky").await;
        assert!(matches!(result, Err(StorageError::Transport { .. })));
        assert!(registry.is_empty().await);

        service.set_unavailable(false);
        let table = registry.get_or_create("bdflaky").await.unwrap();
        assert_eq!(table.name(), "bdflaky");
    }
}
