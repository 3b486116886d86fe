// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model.
//!
//! Every section rejects unknown keys so typos surface at startup instead of
//! being silently ignored.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Courier configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    #[serde(default)]
    pub agent: AgentConfig,

    /// Timing and retry behaviour of the acquisition engine.
    #[serde(default)]
    pub engine: EngineConfig,

    /// How links and channel references are recognised in bot text.
    #[serde(default)]
    pub links: LinksConfig,

    /// Access token minting.
    #[serde(default)]
    pub token: TokenConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP bridge to the platform session sidecar.
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// Process identity and logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "courier".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Engine pacing, timeouts and retry ceilings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// How long to wait for a bot reply before the run counts as timed out.
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,

    /// Fixed pause after every platform-mutating call (join, click).
    #[serde(default = "default_mutation_delay_ms")]
    pub mutation_delay_ms: u64,

    /// Pause before re-reading the prompt message to detect in-place edits.
    #[serde(default = "default_edit_grace_ms")]
    pub edit_grace_ms: u64,

    /// Number of recent bot messages scanned when no button yields media.
    #[serde(default = "default_recent_scan_depth")]
    pub recent_scan_depth: usize,

    /// Upper bound on turns kept in a conversation's history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Re-runs allowed for a link after a retryable failure.
    #[serde(default = "default_max_link_retries")]
    pub max_link_retries: u32,

    /// Delay before re-running a link (a rate-limit wait takes precedence).
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Retries of a single join after a rate-limit signal.
    #[serde(default = "default_join_retry_limit")]
    pub join_retry_limit: u32,

    /// Links resolved concurrently by `serve` and `resolve`.
    #[serde(default = "default_max_concurrent_links")]
    pub max_concurrent_links: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            response_timeout_secs: default_response_timeout_secs(),
            mutation_delay_ms: default_mutation_delay_ms(),
            edit_grace_ms: default_edit_grace_ms(),
            recent_scan_depth: default_recent_scan_depth(),
            history_limit: default_history_limit(),
            max_link_retries: default_max_link_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            join_retry_limit: default_join_retry_limit(),
            max_concurrent_links: default_max_concurrent_links(),
        }
    }
}

impl EngineConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn mutation_delay(&self) -> Duration {
        Duration::from_millis(self.mutation_delay_ms)
    }

    pub fn edit_grace(&self) -> Duration {
        Duration::from_millis(self.edit_grace_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

fn default_response_timeout_secs() -> u64 {
    30
}

fn default_mutation_delay_ms() -> u64 {
    5_000
}

fn default_edit_grace_ms() -> u64 {
    3_000
}

fn default_recent_scan_depth() -> usize {
    50
}

fn default_history_limit() -> usize {
    64
}

fn default_max_link_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    60
}

fn default_join_retry_limit() -> u32 {
    1
}

fn default_max_concurrent_links() -> usize {
    4
}

/// Link and channel-reference recognition.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LinksConfig {
    /// Host of the messaging platform's public links, e.g. `t.me`.
    #[serde(default = "default_platform_host")]
    pub platform_host: String,

    /// Words that look like `@handles` in prose but never name a channel.
    #[serde(default = "default_stop_words")]
    pub stop_words: Vec<String>,

    /// Case-insensitive substrings marking a response as a membership gate.
    #[serde(default = "default_gate_keywords")]
    pub gate_keywords: Vec<String>,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            platform_host: default_platform_host(),
            stop_words: default_stop_words(),
            gate_keywords: default_gate_keywords(),
        }
    }
}

fn default_platform_host() -> String {
    "t.me".to_string()
}

fn default_stop_words() -> Vec<String> {
    ["join", "channel", "the", "to", "and", "or"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_gate_keywords() -> Vec<String> {
    vec!["join".to_string(), "channel".to_string()]
}

/// Access token settings. Both values are deployment constants.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TokenConfig {
    /// Operator storage channel id; its absolute value is the token multiplier.
    #[serde(default)]
    pub storage_channel_id: Option<i64>,

    /// Handle of the redemption bot that appears in access links.
    #[serde(default)]
    pub vending_handle: Option<String>,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// Persist dedup records; when off, dedup lives only as long as the process.
    #[serde(default = "default_true")]
    pub durable_dedup: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
            durable_dedup: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("courier").join("courier.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("courier.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_true() -> bool {
    true
}

/// Platform bridge endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    #[serde(default = "default_bridge_url")]
    pub base_url: String,

    /// Bearer token presented to the bridge. `None` sends no credentials.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Timeout for ordinary JSON calls. Long-polls add the response timeout on top.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Timeout for media downloads and uploads.
    #[serde(default = "default_transfer_timeout_secs")]
    pub transfer_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_bridge_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            transfer_timeout_secs: default_transfer_timeout_secs(),
        }
    }
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_transfer_timeout_secs() -> u64 {
    900
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_durations_follow_units() {
        let engine = EngineConfig {
            response_timeout_secs: 7,
            mutation_delay_ms: 250,
            edit_grace_ms: 1500,
            retry_delay_secs: 2,
            ..EngineConfig::default()
        };
        assert_eq!(engine.response_timeout(), Duration::from_secs(7));
        assert_eq!(engine.mutation_delay(), Duration::from_millis(250));
        assert_eq!(engine.edit_grace(), Duration::from_millis(1500));
        assert_eq!(engine.retry_delay(), Duration::from_secs(2));
    }

    #[test]
    fn default_stop_words_cover_prose() {
        let links = LinksConfig::default();
        for word in ["join", "channel", "the", "to", "and", "or"] {
            assert!(links.stop_words.iter().any(|w| w == word));
        }
    }
}
