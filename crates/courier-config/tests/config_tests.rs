// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Courier configuration system.

use courier_config::diagnostic::{ConfigError, suggest_key};
use courier_config::model::CourierConfig;
use courier_config::{load_and_validate_str, load_config, load_config_from_str};
use figment::Jail;

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[agent]
name = "edge-1"
log_level = "debug"

[engine]
response_timeout_secs = 45
mutation_delay_ms = 1000
edit_grace_ms = 2000
recent_scan_depth = 20
history_limit = 16
max_link_retries = 2
retry_delay_secs = 10
join_retry_limit = 2
max_concurrent_links = 8

[links]
platform_host = "telegram.me"
stop_words = ["the"]
gate_keywords = ["subscribe"]

[token]
storage_channel_id = -1002818242381
vending_handle = "vault_bot"

[storage]
database_path = "/tmp/courier-test.db"
wal_mode = false
durable_dedup = false

[bridge]
base_url = "https://bridge.internal:9000"
api_token = "secret"
request_timeout_secs = 15
transfer_timeout_secs = 120
"#;

    let config = load_and_validate_str(toml).expect("valid TOML should validate");
    assert_eq!(config.agent.name, "edge-1");
    assert_eq!(config.engine.response_timeout_secs, 45);
    assert_eq!(config.engine.max_concurrent_links, 8);
    assert_eq!(config.links.platform_host, "telegram.me");
    assert_eq!(config.links.gate_keywords, vec!["subscribe"]);
    assert_eq!(config.token.storage_channel_id, Some(-1002818242381));
    assert_eq!(config.token.vending_handle.as_deref(), Some("vault_bot"));
    assert!(!config.storage.wal_mode);
    assert!(!config.storage.durable_dedup);
    assert_eq!(config.bridge.api_token.as_deref(), Some("secret"));
    assert_eq!(config.bridge.transfer_timeout_secs, 120);
}

#[test]
fn empty_toml_uses_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.agent.name, "courier");
    assert_eq!(config.agent.log_level, "info");
    assert_eq!(config.engine.response_timeout_secs, 30);
    assert_eq!(config.engine.mutation_delay_ms, 5_000);
    assert_eq!(config.engine.edit_grace_ms, 3_000);
    assert_eq!(config.engine.recent_scan_depth, 50);
    assert_eq!(config.engine.max_link_retries, 3);
    assert_eq!(config.engine.retry_delay_secs, 60);
    assert_eq!(config.engine.join_retry_limit, 1);
    assert_eq!(config.links.platform_host, "t.me");
    assert!(config.token.storage_channel_id.is_none());
    assert!(config.token.vending_handle.is_none());
    assert!(config.storage.database_path.ends_with("courier.db"));
    assert!(config.storage.wal_mode);
    assert!(config.storage.durable_dedup);
    assert_eq!(config.bridge.base_url, "http://127.0.0.1:8081");
}

#[test]
fn unknown_section_is_rejected() {
    let toml = r#"
[logging]
level = "debug"
"#;
    let err = load_config_from_str(toml).expect_err("unknown section should be rejected");
    let err_str = err.to_string();
    assert!(
        err_str.contains("unknown field") || err_str.contains("logging"),
        "got: {err_str}"
    );
}

#[test]
fn typo_in_section_suggests_correction() {
    let toml = r#"
[engine]
respose_timeout_secs = 10
"#;

    let errors = load_and_validate_str(toml).expect_err("typo should be rejected");
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "respose_timeout_secs"
                && suggestion.as_deref() == Some("response_timeout_secs")
                && valid_keys.contains("mutation_delay_ms")
        })
    });
    assert!(found, "expected UnknownKey with suggestion, got: {errors:?}");
}

#[test]
fn invalid_type_is_reported_with_key_path() {
    let toml = r#"
[engine]
max_link_retries = "three"
"#;

    let errors = load_and_validate_str(toml).expect_err("wrong type should be rejected");
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::InvalidType { key, .. } if key.ends_with("max_link_retries"))
    });
    assert!(found, "expected InvalidType, got: {errors:?}");
}

#[test]
fn validation_errors_surface_through_loader() {
    let toml = r#"
[token]
storage_channel_id = 0

[bridge]
base_url = "bridge:8081"
"#;

    let errors = load_and_validate_str(toml).expect_err("should fail validation");
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    assert!(messages.iter().any(|m| m.contains("storage_channel_id")));
    assert!(messages.iter().any(|m| m.contains("base_url")));
}

#[test]
fn suggestions_ignore_distant_keys() {
    assert_eq!(
        suggest_key("vendng_handle", &["storage_channel_id", "vending_handle"]),
        Some("vending_handle".to_string())
    );
    assert!(suggest_key("qqqq", &["storage_channel_id", "vending_handle"]).is_none());
}

#[test]
fn unknown_key_diagnostic_renders_help() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "vendng_handle".to_string(),
        suggestion: Some("vending_handle".to_string()),
        valid_keys: "storage_channel_id, vending_handle".to_string(),
        span: None,
        src: None,
    };

    assert!(error.code().is_some());
    let help = error.help().expect("help text").to_string();
    assert!(help.contains("did you mean `vending_handle`"), "got: {help}");

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render");
    assert!(buf.contains("vendng_handle"));
}

#[test]
fn local_file_and_env_layer_in_order() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "courier.toml",
            r#"
[agent]
name = "from-file"

[engine]
max_link_retries = 5

[token]
vending_handle = "file_bot"
"#,
        )?;
        jail.set_env("COURIER_ENGINE_MAX_LINK_RETRIES", "9");
        jail.set_env("COURIER_TOKEN_STORAGE_CHANNEL_ID", "-100123");

        let config: CourierConfig = load_config()?;
        assert_eq!(config.agent.name, "from-file");
        assert_eq!(config.engine.max_link_retries, 9);
        assert_eq!(config.token.storage_channel_id, Some(-100123));
        assert_eq!(config.token.vending_handle.as_deref(), Some("file_bot"));
        Ok(())
    });
}

#[test]
fn env_underscored_keys_keep_their_underscores() {
    Jail::expect_with(|jail| {
        jail.set_env("COURIER_BRIDGE_API_TOKEN", "tok");
        jail.set_env("COURIER_STORAGE_DURABLE_DEDUP", "false");

        let config = load_config()?;
        assert_eq!(config.bridge.api_token.as_deref(), Some("tok"));
        assert!(!config.storage.durable_dedup);
        Ok(())
    });
}
