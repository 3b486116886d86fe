// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier resolve` command implementation.

use courier_config::CourierConfig;
use courier_core::{CourierError, SourceLink};
use courier_engine::{Engine, Resolution};
use tracing::warn;

use crate::runtime;

pub async fn run_resolve(config: &CourierConfig, raw_links: &[String]) -> Result<(), CourierError> {
    let engine = runtime::build_engine(config).await?;
    let output = resolve_links(&engine, raw_links).await?;
    print!("{output}");
    Ok(())
}

/// Resolve every parseable link concurrently. Rejected lines are listed
/// first, then results in input order. A credential failure on any link
/// fails the whole command.
pub async fn resolve_links(engine: &Engine, raw_links: &[String]) -> Result<String, CourierError> {
    let mut links: Vec<SourceLink> = Vec::with_capacity(raw_links.len());
    let mut out = String::new();
    for raw in raw_links {
        match engine.parse_link(raw) {
            Ok(link) => links.push(link),
            Err(e) => {
                warn!(link = %raw, error = %e, "skipping link");
                out.push_str(&format!("{raw}: rejected ({e})\n"));
            }
        }
    }

    let results = engine.resolve_all(&links).await?;
    for (link, resolution) in links.iter().zip(&results) {
        out.push_str(&render(link, resolution));
    }
    Ok(out)
}

fn render(link: &SourceLink, resolution: &Resolution) -> String {
    let mut out = format!("{}: {}\n", link.raw(), resolution.label());
    for token in resolution.tokens() {
        out.push_str(&format!("    {token}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::ResponseNode;
    use courier_test_utils::fixtures::video;
    use courier_test_utils::{BotScript, ScriptedError, TestHarness};

    #[tokio::test]
    async fn prints_access_links_in_input_order() {
        let harness = TestHarness::new().await.unwrap();
        harness
            .platform
            .script_bot(
                "files_bot",
                BotScript::replying(ResponseNode::text(500, "here").with_media(video(1))),
            )
            .await;
        harness
            .platform
            .script_bot("empty_bot", BotScript::replying(ResponseNode::text(500, "nothing")))
            .await;

        let out = resolve_links(
            &harness.engine,
            &[
                "https://t.me/files_bot?start=a".to_string(),
                "not a link".to_string(),
                "https://t.me/empty_bot?start=b".to_string(),
            ],
        )
        .await
        .unwrap();

        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("not a link: rejected"));
        assert_eq!(lines[1], "https://t.me/files_bot?start=a: resolved");
        assert!(lines[2].starts_with("    https://t.me/vault_bot?start="));
        assert_eq!(lines[3], "https://t.me/empty_bot?start=b: empty");
    }

    #[tokio::test]
    async fn credential_failure_fails_the_command() {
        let harness = TestHarness::new().await.unwrap();
        harness
            .platform
            .script_bot("files_bot", BotScript::replying(ResponseNode::text(500, "x")))
            .await;
        harness
            .platform
            .fail_command("files_bot", ScriptedError::Unauthorized)
            .await;

        let err = resolve_links(&harness.engine, &["https://t.me/files_bot?start=a".to_string()])
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
