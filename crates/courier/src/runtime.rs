// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiring shared by the commands that talk to the platform.

use std::sync::Arc;

use courier_bridge::BridgePlatform;
use courier_config::CourierConfig;
use courier_core::{CourierError, StorageAdapter};
use courier_engine::Engine;
use courier_storage::SqliteStorage;
use tracing::info;

/// Open and migrate the configured SQLite database.
pub async fn open_storage(config: &CourierConfig) -> Result<Arc<dyn StorageAdapter>, CourierError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    Ok(Arc::new(storage))
}

/// An engine over the HTTP bridge. The database is only opened when dedup
/// records are durable.
pub async fn build_engine(config: &CourierConfig) -> Result<Engine, CourierError> {
    let platform = Arc::new(BridgePlatform::new(&config.bridge)?);
    let storage = if config.storage.durable_dedup {
        Some(open_storage(config).await?)
    } else {
        None
    };
    let engine = Engine::new(platform, storage, config)?;
    info!(
        agent = %config.agent.name,
        durable_dedup = config.storage.durable_dedup,
        max_concurrent_links = engine.settings().max_concurrent_links,
        "engine ready"
    );
    Ok(engine)
}
