//! Live migration between two bot data stores
//!
//! [`BotDataStoreBridge`] is registered in place of a store while its records
//! move to a new backend. Reads consult both stores, writes go only to the
//! target, so each record migrates the first time the bot saves it.

use crate::error::StorageResult;
use crate::storage::BotDataStore;
use crate::types::{Address, BotData, StoreType, WILDCARD_ETAG};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Store that reads from `source` and `target` and writes to `target`
///
/// `source` is never written or deleted from. A record that only exists in
/// `source` is returned with a `"*"` eTag, so the caller's next save lands in
/// `target` unconditionally.
#[derive(Clone)]
pub struct BotDataStoreBridge {
    source: Arc<dyn BotDataStore>,
    target: Arc<dyn BotDataStore>,
}

impl BotDataStoreBridge {
    pub fn new(source: Arc<dyn BotDataStore>, target: Arc<dyn BotDataStore>) -> Self {
        Self { source, target }
    }

    /// Store being migrated from
    pub fn source(&self) -> &Arc<dyn BotDataStore> {
        &self.source
    }

    /// Store being migrated to
    pub fn target(&self) -> &Arc<dyn BotDataStore> {
        &self.target
    }
}

#[async_trait]
impl BotDataStore for BotDataStoreBridge {
    async fn load(&self, address: &Address, store_type: StoreType) -> StorageResult<BotData> {
        // Both reads in flight at once; either failing fails the load.
        let (source, target) = tokio::try_join!(
            self.source.load(address, store_type),
            self.target.load(address, store_type)
        )?;

        if target.etag.is_empty() {
            debug!(%address, %store_type, "Serving unmigrated record from source");
            return Ok(BotData::new(WILDCARD_ETAG, source.data));
        }
        Ok(target)
    }

    async fn save(
        &self,
        address: &Address,
        store_type: StoreType,
        data: BotData,
    ) -> StorageResult<()> {
        self.target.save(address, store_type, data).await
    }

    async fn flush(&self, address: &Address) -> StorageResult<bool> {
        self.target.flush(address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryBotDataStore;
    use serde_json::json;

    fn bridge() -> (InMemoryBotDataStore, InMemoryBotDataStore, BotDataStoreBridge) {
        let source = InMemoryBotDataStore::new();
        let target = InMemoryBotDataStore::new();
        let bridge = BotDataStoreBridge::new(Arc::new(source.clone()), Arc::new(target.clone()));
        (source, target, bridge)
    }

    fn address() -> Address {
        Address::new("B1", "test")
            .with_conversation("C1")
            .with_user("U1")
    }

    #[tokio::test]
    async fn test_empty_everywhere_loads_wildcard_empty() {
        let (_, _, bridge) = bridge();
        let loaded = bridge.load(&address(), StoreType::UserData).await.unwrap();
        assert_eq!(loaded.etag, WILDCARD_ETAG);
        assert_eq!(loaded.data, None);
    }

    #[tokio::test]
    async fn test_target_record_wins() {
        let (source, target, bridge) = bridge();
        let store_type = StoreType::ConversationData;
        source
            .save(&address(), store_type, BotData::wildcard(Some(json!("old"))))
            .await
            .unwrap();
        target
            .save(&address(), store_type, BotData::wildcard(Some(json!("new"))))
            .await
            .unwrap();

        let expected = target.load(&address(), store_type).await.unwrap();
        let loaded = bridge.load(&address(), store_type).await.unwrap();
        assert_eq!(loaded, expected);
    }

    #[tokio::test]
    async fn test_save_only_touches_target() {
        let (source, target, bridge) = bridge();
        bridge
            .save(&address(), StoreType::UserData, BotData::wildcard(Some(json!(1))))
            .await
            .unwrap();
        assert!(source.is_empty().await);
        assert_eq!(target.len().await, 1);
        assert!(bridge.flush(&address()).await.unwrap());
    }
}
