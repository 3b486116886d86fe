// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier doctor` command implementation.
//!
//! Runs diagnostic checks against the Courier environment: configuration,
//! token settings, the SQLite database and the platform bridge.

use std::io::IsTerminal;
use std::path::Path;
use std::time::{Duration, Instant};

use courier_bridge::BridgePlatform;
use courier_config::CourierConfig;
use courier_core::{CourierError, HealthStatus, PluginAdapter, TokenCodec};

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    /// Human-readable message.
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `courier doctor` command.
///
/// Failing checks are reported, not returned as errors.
pub async fn run_doctor(
    config: &CourierConfig,
    config_path: Option<&Path>,
    plain: bool,
) -> Result<(), CourierError> {
    let use_color = !plain && std::io::stdout().is_terminal();
    let results = vec![
        check_config(config_path),
        check_token(config),
        check_database(&config.storage.database_path).await,
        check_bridge(config).await,
    ];
    print!("{}", render(&results, use_color));
    Ok(())
}

fn render(results: &[CheckResult], use_color: bool) -> String {
    let mut out = String::new();
    out.push_str("\n  courier doctor\n");
    out.push_str(&format!("  {}\n", "-".repeat(50)));

    let mut issues = 0;
    for result in results {
        let duration_ms = result.duration.as_millis();
        let (symbol, message) = match (&result.status, use_color) {
            (CheckStatus::Pass, false) => ("[OK]  ".to_string(), result.message.clone()),
            (CheckStatus::Warn, false) => ("[WARN]".to_string(), result.message.clone()),
            (CheckStatus::Fail, false) => ("[FAIL]".to_string(), result.message.clone()),
            (status, true) => {
                use colored::Colorize;
                match status {
                    CheckStatus::Pass => ("✓".green().to_string(), result.message.clone()),
                    CheckStatus::Warn => {
                        ("!".yellow().to_string(), result.message.yellow().to_string())
                    }
                    CheckStatus::Fail => ("✗".red().to_string(), result.message.red().to_string()),
                }
            }
        };
        if result.status != CheckStatus::Pass {
            issues += 1;
        }
        out.push_str(&format!(
            "    {symbol} {:<14} {message} ({duration_ms}ms)\n",
            result.name
        ));
    }

    out.push('\n');
    match issues {
        0 => out.push_str("  All checks passed.\n"),
        1 => out.push_str("  1 issue found.\n"),
        n => out.push_str(&format!("  {n} issues found.\n")),
    }
    out.push('\n');
    out
}

fn check_config(path: Option<&Path>) -> CheckResult {
    let start = Instant::now();
    let loaded = match path {
        Some(path) => courier_config::load_and_validate_path(path),
        None => courier_config::load_and_validate(),
    };
    match loaded {
        Ok(_) => CheckResult::new("Configuration", CheckStatus::Pass, "valid", start),
        Err(errors) => CheckResult::new(
            "Configuration",
            CheckStatus::Fail,
            format!("{} error(s)", errors.len()),
            start,
        ),
    }
}

/// Minting needs both token settings; decoding only the channel.
fn check_token(config: &CourierConfig) -> CheckResult {
    let start = Instant::now();
    let Some(channel) = config.token.storage_channel_id else {
        return CheckResult::new(
            "Token",
            CheckStatus::Fail,
            "token.storage_channel_id is not set",
            start,
        );
    };
    if let Err(e) = TokenCodec::new(channel) {
        return CheckResult::new("Token", CheckStatus::Fail, e.to_string(), start);
    }
    match config.token.vending_handle.as_deref() {
        Some(handle) => CheckResult::new(
            "Token",
            CheckStatus::Pass,
            format!("links via {}/{handle}", config.links.platform_host),
            start,
        ),
        None => CheckResult::new(
            "Token",
            CheckStatus::Warn,
            "token.vending_handle is not set; only decoding will work",
            start,
        ),
    }
}

/// Check the database file exists, opens, and carries the schema.
async fn check_database(db_path: &str) -> CheckResult {
    let start = Instant::now();
    if !Path::new(db_path).exists() {
        return CheckResult::new(
            "Database",
            CheckStatus::Warn,
            format!("not found: {db_path} (will be created on first run)"),
            start,
        );
    }

    let conn = match tokio_rusqlite::Connection::open(db_path).await {
        Ok(conn) => conn,
        Err(e) => {
            return CheckResult::new("Database", CheckStatus::Fail, format!("open failed: {e}"), start);
        }
    };
    let counted = conn
        .call(|conn| -> Result<i64, rusqlite::Error> {
            conn.query_row("SELECT COUNT(*) FROM link_records", [], |row| row.get(0))
        })
        .await;

    match counted {
        Ok(records) => CheckResult::new(
            "Database",
            CheckStatus::Pass,
            format!("connected, {records} link record(s)"),
            start,
        ),
        Err(e) => CheckResult::new("Database", CheckStatus::Fail, format!("query failed: {e}"), start),
    }
}

async fn check_bridge(config: &CourierConfig) -> CheckResult {
    let start = Instant::now();
    let bridge = match BridgePlatform::new(&config.bridge) {
        Ok(bridge) => bridge,
        Err(e) => return CheckResult::new("Bridge", CheckStatus::Fail, e.to_string(), start),
    };
    match bridge.health_check().await {
        Ok(HealthStatus::Healthy) => CheckResult::new(
            "Bridge",
            CheckStatus::Pass,
            format!("reachable at {}", config.bridge.base_url),
            start,
        ),
        Ok(HealthStatus::Degraded(reason)) => {
            CheckResult::new("Bridge", CheckStatus::Warn, reason, start)
        }
        Ok(HealthStatus::Unhealthy(reason)) => {
            CheckResult::new("Bridge", CheckStatus::Fail, reason, start)
        }
        Err(e) => CheckResult::new("Bridge", CheckStatus::Fail, e.to_string(), start),
    }
}
