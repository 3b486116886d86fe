// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use courier_config::model::StorageConfig;
use courier_core::{
    AdapterType, CourierError, HealthStatus, LinkRecord, MediaFingerprint, PluginAdapter,
    RelocatedAsset, StorageAdapter,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// The database is opened lazily by [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// The connection is not opened until [`StorageAdapter::initialize`] is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, CourierError> {
        self.db.get().ok_or_else(|| CourierError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), CourierError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| CourierError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), CourierError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    async fn get_link_record(
        &self,
        original_link: &str,
    ) -> Result<Option<LinkRecord>, CourierError> {
        queries::links::get_link_record(self.db()?, original_link).await
    }

    async fn put_link_record(&self, record: &LinkRecord) -> Result<(), CourierError> {
        queries::links::upsert_link_record(self.db()?, record).await
    }

    async fn list_link_records(&self, limit: usize) -> Result<Vec<LinkRecord>, CourierError> {
        queries::links::list_link_records(self.db()?, limit).await
    }

    async fn get_relocated(
        &self,
        fingerprint: &MediaFingerprint,
    ) -> Result<Option<RelocatedAsset>, CourierError> {
        queries::media::get_relocated(self.db()?, fingerprint).await
    }

    async fn put_relocated(&self, asset: &RelocatedAsset) -> Result<(), CourierError> {
        queries::media::insert_relocated(self.db()?, asset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::MediaMetadata;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
            durable_dedup: true,
        }
    }

    #[tokio::test]
    async fn identity_is_reported() {
        let storage = SqliteStorage::new(make_config("unused.db"));
        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(storage.initialize().await.is_err());
    }

    #[tokio::test]
    async fn operations_fail_before_initialize() {
        let storage = SqliteStorage::new(make_config("never-opened.db"));
        assert!(storage.health_check().await.is_err());
        assert!(storage.get_link_record("x").await.is_err());
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("persist.db");
        let path = db_path.to_str().unwrap();

        let record = LinkRecord {
            original_link: "https://t.me/files_bot?start=abc".into(),
            access_tokens: vec!["https://t.me/vault_bot?start=Z2V0LTE".into()],
            media_fingerprints: vec![MediaFingerprint {
                media_id: 9,
                access_hash: 8,
                dc_id: 1,
            }],
            resolved_at: "2026-05-01T12:00:00Z".into(),
        };
        let asset = RelocatedAsset {
            storage_channel: -100,
            message_index: 3,
            fingerprint: record.media_fingerprints[0],
            metadata: MediaMetadata::default(),
            caption: None,
        };

        {
            let storage = SqliteStorage::new(make_config(path));
            storage.initialize().await.unwrap();
            assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
            storage.put_link_record(&record).await.unwrap();
            storage.put_relocated(&asset).await.unwrap();
            storage.shutdown().await.unwrap();
        }

        let storage = SqliteStorage::new(make_config(path));
        storage.initialize().await.unwrap();
        assert_eq!(
            storage.get_link_record(&record.original_link).await.unwrap(),
            Some(record.clone())
        );
        assert_eq!(
            storage.get_relocated(&asset.fingerprint).await.unwrap(),
            Some(asset)
        );
        assert_eq!(storage.list_link_records(10).await.unwrap(), vec![record]);
        storage.close().await.unwrap();
    }
}
