// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end engine tests.
//!
//! `TestHarness` assembles a real [`Engine`] over a [`ScriptedPlatform`] and
//! a temporary SQLite database, with every pacing delay set to zero.

use std::sync::Arc;

use courier_config::model::{CourierConfig, StorageConfig};
use courier_core::{CourierError, LinkRecord, StorageAdapter};
use courier_engine::{Engine, Resolution};
use courier_storage::SqliteStorage;

use crate::scripted_platform::ScriptedPlatform;

/// Storage channel used by harness engines.
pub const STORAGE_CHANNEL: i64 = -1002818242381;

/// Vending handle used in harness access links.
pub const VENDING_HANDLE: &str = "vault_bot";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: CourierConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = CourierConfig::default();
        config.engine.mutation_delay_ms = 0;
        config.engine.edit_grace_ms = 0;
        config.engine.retry_delay_secs = 0;
        config.token.storage_channel_id = Some(STORAGE_CHANNEL);
        config.token.vending_handle = Some(VENDING_HANDLE.to_string());
        Self { config }
    }

    /// Tweak the configuration before the engine is built.
    pub fn configure(mut self, f: impl FnOnce(&mut CourierConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Keep dedup state in memory only.
    pub fn without_durable_dedup(mut self) -> Self {
        self.config.storage.durable_dedup = false;
        self
    }

    pub async fn build(self) -> Result<TestHarness, CourierError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| CourierError::Storage {
            source: Box::new(e),
        })?;
        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: temp_dir.path().join("test.db").to_string_lossy().into_owned(),
            ..config.storage
        };

        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        let storage: Arc<dyn StorageAdapter> = Arc::new(storage);

        let platform = Arc::new(ScriptedPlatform::new());
        let engine = Engine::new(platform.clone(), Some(Arc::clone(&storage)), &config)?;

        Ok(TestHarness {
            platform,
            storage,
            engine: Arc::new(engine),
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete engine wired to scripted collaborators.
pub struct TestHarness {
    pub platform: Arc<ScriptedPlatform>,
    pub storage: Arc<dyn StorageAdapter>,
    pub engine: Arc<Engine>,
    pub config: CourierConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub async fn new() -> Result<Self, CourierError> {
        Self::builder().build().await
    }

    /// Parse and resolve `raw`, draining nested links.
    pub async fn resolve(&self, raw: &str) -> Result<Resolution, CourierError> {
        let link = self.engine.parse_link(raw)?;
        self.engine.resolve(&link).await
    }

    /// Replace the engine with a fresh one over the same database, as after
    /// a process restart.
    pub fn restart_engine(&mut self) -> Result<(), CourierError> {
        let engine = Engine::new(
            self.platform.clone(),
            Some(Arc::clone(&self.storage)),
            &self.config,
        )?;
        self.engine = Arc::new(engine);
        Ok(())
    }

    pub async fn records(&self, limit: usize) -> Result<Vec<LinkRecord>, CourierError> {
        self.storage.list_link_records(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::video;
    use crate::scripted_platform::BotScript;
    use courier_core::ResponseNode;

    #[tokio::test]
    async fn harness_resolves_and_records() {
        let harness = TestHarness::new().await.unwrap();
        harness
            .platform
            .script_bot(
                "files_bot",
                BotScript::replying(ResponseNode::text(500, "here").with_media(video(1))),
            )
            .await;

        let resolution = harness.resolve("https://t.me/files_bot?start=a").await.unwrap();
        assert_eq!(resolution.tokens().len(), 1);

        let records = harness.records(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].original_link, "https://t.me/files_bot?start=a");
        assert_eq!(records[0].access_tokens, resolution.tokens());
    }
}
