// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with figment.
//!
//! Merge order, later wins: compiled defaults, `/etc/courier/courier.toml`,
//! `~/.config/courier/courier.toml`, `./courier.toml`, then `COURIER_*`
//! environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CourierConfig;

/// Top-level tables, used to turn `COURIER_ENGINE_MAX_LINK_RETRIES` into
/// `engine.max_link_retries`.
const SECTIONS: &[&str] = &["agent", "engine", "links", "token", "storage", "bridge"];

pub(crate) const SYSTEM_CONFIG: &str = "/etc/courier/courier.toml";
pub(crate) const LOCAL_CONFIG: &str = "courier.toml";

pub(crate) fn user_config() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("courier/courier.toml"))
        .unwrap_or_default()
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<CourierConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string on top of the defaults only.
pub fn load_config_from_str(toml_content: &str) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from one explicit file plus env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The figment behind [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// `COURIER_` variables mapped section-first.
///
/// Only the leading section name is split off; the remainder keeps its
/// underscores, so `COURIER_TOKEN_STORAGE_CHANNEL_ID` lands on
/// `token.storage_channel_id`.
fn env_provider() -> Env {
    Env::prefixed("COURIER_").map(|key| env_key_to_path(key.as_str()).into())
}

pub(crate) fn env_key_to_path(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key
}
