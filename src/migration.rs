//! Bulk copy of records from one store to another
//!
//! Runs alongside a [`crate::bridge::BotDataStoreBridge`]: records the bridge
//! has already migrated on demand are detected by the create-only save
//! failing, and skipped.

use crate::config::MigrationConfig;
use crate::error::{StorageError, StorageResult};
use crate::storage::BotDataStore;
use crate::types::{Address, BotData, StoreType};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of copying a single record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordOutcome {
    Copied,
    AlreadyMigrated,
    Missing,
}

/// Totals for one [`BotDataMigrator::migrate`] run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub copied: usize,
    pub already_migrated: usize,
    pub missing: usize,
}

impl MigrationReport {
    fn record(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Copied => self.copied += 1,
            RecordOutcome::AlreadyMigrated => self.already_migrated += 1,
            RecordOutcome::Missing => self.missing += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.copied + self.already_migrated + self.missing
    }
}

/// Copies records from `source` to `target` without overwriting anything
pub struct BotDataMigrator {
    source: Arc<dyn BotDataStore>,
    target: Arc<dyn BotDataStore>,
    config: MigrationConfig,
}

impl BotDataMigrator {
    pub fn new(
        source: Arc<dyn BotDataStore>,
        target: Arc<dyn BotDataStore>,
        config: MigrationConfig,
    ) -> Self {
        Self {
            source,
            target,
            config,
        }
    }

    /// Copy one record
    ///
    /// A record already present in `target` is left untouched.
    pub async fn migrate_record(
        &self,
        address: &Address,
        store_type: StoreType,
    ) -> StorageResult<RecordOutcome> {
        let record = self.source.load(address, store_type).await?;
        let Some(payload) = record.into_payload() else {
            return Ok(RecordOutcome::Missing);
        };

        match self
            .target
            .save(address, store_type, BotData::new("", Some(payload)))
            .await
        {
            Ok(()) => Ok(RecordOutcome::Copied),
            Err(err) if err.is_concurrency_conflict() => {
                debug!(%address, %store_type, "Record already migrated");
                Ok(RecordOutcome::AlreadyMigrated)
            }
            Err(err) => Err(err),
        }
    }

    /// Copy every record in `records`, up to `concurrency` at a time
    ///
    /// Stops at the first error other than an already-migrated record.
    pub async fn migrate<I>(&self, records: I) -> StorageResult<MigrationReport>
    where
        I: IntoIterator<Item = (Address, StoreType)>,
    {
        let report = stream::iter(records)
            .map(|(address, store_type)| async move {
                self.migrate_record(&address, store_type).await
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .try_fold(MigrationReport::default(), |mut report, outcome| async move {
                report.record(outcome);
                Ok::<_, StorageError>(report)
            })
            .await?;

        info!(
            copied = report.copied,
            already_migrated = report.already_migrated,
            missing = report.missing,
            "Bot data migration finished"
        );
        Ok(report)
    }
}
