// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the durable dedup records.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{LinkRecord, MediaFingerprint, RelocatedAsset};

/// Durable store for resolved links and relocated media.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), CourierError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), CourierError>;

    async fn get_link_record(&self, original_link: &str)
    -> Result<Option<LinkRecord>, CourierError>;

    /// Inserts or replaces the record for `record.original_link`.
    async fn put_link_record(&self, record: &LinkRecord) -> Result<(), CourierError>;

    /// Most recent records first.
    async fn list_link_records(&self, limit: usize) -> Result<Vec<LinkRecord>, CourierError>;

    async fn get_relocated(
        &self,
        fingerprint: &MediaFingerprint,
    ) -> Result<Option<RelocatedAsset>, CourierError>;

    async fn put_relocated(&self, asset: &RelocatedAsset) -> Result<(), CourierError>;
}
