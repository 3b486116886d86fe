// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier records` command implementation.

use courier_config::CourierConfig;
use courier_core::{CourierError, LinkRecord};

use crate::runtime;

pub async fn run_records(config: &CourierConfig, limit: usize, json: bool) -> Result<(), CourierError> {
    let storage = runtime::open_storage(config).await?;
    let records = storage.list_link_records(limit).await?;
    storage.close().await?;
    print!("{}", render(&records, json)?);
    Ok(())
}

/// Plain output is one header line per record followed by its access links.
/// JSON output is the persisted record shape, newest first.
fn render(records: &[LinkRecord], json: bool) -> Result<String, CourierError> {
    if json {
        let mut out = serde_json::to_string_pretty(records)
            .map_err(|e| CourierError::Internal(format!("failed to serialize records: {e}")))?;
        out.push('\n');
        return Ok(out);
    }

    if records.is_empty() {
        return Ok("no link records\n".to_string());
    }
    let mut out = String::new();
    for record in records {
        out.push_str(&format!(
            "{}  {} ({} media)\n",
            record.resolved_at,
            record.original_link,
            record.media_fingerprints.len()
        ));
        for token in &record.access_tokens {
            out.push_str(&format!("    {token}\n"));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::MediaFingerprint;

    fn record() -> LinkRecord {
        LinkRecord {
            original_link: "https://t.me/files_bot?start=abc".into(),
            access_tokens: vec!["https://t.me/vault_bot?start=Z2V0LTE".into()],
            media_fingerprints: vec![MediaFingerprint {
                media_id: 1,
                access_hash: 2,
                dc_id: 4,
            }],
            resolved_at: "2026-03-01T10:00:00+00:00".into(),
        }
    }

    #[test]
    fn json_uses_the_external_field_names() {
        let out = render(&[record()], true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        let first = &value[0];
        assert_eq!(first["originalLink"], "https://t.me/files_bot?start=abc");
        assert_eq!(first["accessTokens"][0], "https://t.me/vault_bot?start=Z2V0LTE");
        assert_eq!(first["resolvedAt"], "2026-03-01T10:00:00+00:00");
        assert_eq!(first["mediaFingerprints"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn plain_lists_tokens_under_each_link() {
        let out = render(&[record()], false).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines[0],
            "2026-03-01T10:00:00+00:00  https://t.me/files_bot?start=abc (1 media)"
        );
        assert_eq!(lines[1], "    https://t.me/vault_bot?start=Z2V0LTE");
    }

    #[test]
    fn empty_listing_says_so() {
        assert_eq!(render(&[], false).unwrap(), "no link records\n");
        assert_eq!(render(&[], true).unwrap(), "[]\n");
    }
}
