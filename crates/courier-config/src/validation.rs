// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use crate::diagnostic::ConfigError;
use crate::model::CourierConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Collects every problem instead of stopping at the first one.
pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.agent.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ConfigError::validation(format!(
            "agent.log_level `{}` must be one of {}",
            config.agent.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    let engine = &config.engine;
    for (key, value) in [
        ("engine.response_timeout_secs", engine.response_timeout_secs),
        ("bridge.request_timeout_secs", config.bridge.request_timeout_secs),
        ("bridge.transfer_timeout_secs", config.bridge.transfer_timeout_secs),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!("{key} must be greater than 0")));
        }
    }
    for (key, value) in [
        ("engine.recent_scan_depth", engine.recent_scan_depth),
        ("engine.history_limit", engine.history_limit),
        ("engine.max_concurrent_links", engine.max_concurrent_links),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!("{key} must be at least 1")));
        }
    }

    let host = config.links.platform_host.trim();
    if host.is_empty() || host.contains("://") || host.contains('/') {
        errors.push(ConfigError::validation(format!(
            "links.platform_host `{host}` must be a bare host name such as `t.me`"
        )));
    }
    if config.links.gate_keywords.iter().all(|k| k.trim().is_empty()) {
        errors.push(ConfigError::validation(
            "links.gate_keywords must contain at least one keyword",
        ));
    }

    if config.token.storage_channel_id == Some(0) {
        errors.push(ConfigError::validation(
            "token.storage_channel_id must be non-zero",
        ));
    }
    if let Some(handle) = &config.token.vending_handle {
        let handle = handle.trim().trim_start_matches('@');
        if handle.is_empty() || !handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            errors.push(ConfigError::validation(format!(
                "token.vending_handle `{handle}` must be a non-empty handle of letters, digits and underscores"
            )));
        }
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation("storage.database_path must not be empty"));
    }

    let url = config.bridge.base_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        errors.push(ConfigError::validation(format!(
            "bridge.base_url `{url}` must start with http:// or https://"
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
