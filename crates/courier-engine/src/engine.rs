// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The acquisition engine: claim, run, retry, record, then drain nested links.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use courier_config::model::CourierConfig;
use courier_core::{
    AccessLinkFormat, CourierError, LinkRecord, MessagingPlatform, SourceLink, StorageAdapter,
    TokenCodec,
};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{error, info, warn};

use crate::dedup::{DedupController, LinkClaim};
use crate::extract::LinkPatterns;
use crate::gate::GateJoiner;
use crate::machine::{LinkRun, RunContext, RunOutcome, RunReport};
use crate::queue::LinkQueue;
use crate::relocation::MediaRelocator;

/// Resolved runtime knobs, derived once from [`CourierConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub response_timeout: Duration,
    pub mutation_delay: Duration,
    pub edit_grace: Duration,
    pub recent_scan_depth: usize,
    pub history_limit: usize,
    pub max_link_retries: u32,
    pub retry_delay: Duration,
    pub join_retry_limit: u32,
    pub max_concurrent_links: usize,
    pub storage_channel: i64,
    pub codec: TokenCodec,
    pub access_links: AccessLinkFormat,
}

impl EngineSettings {
    /// Fails when the token section is incomplete; the engine cannot mint
    /// anything without a storage channel and a vending handle.
    pub fn from_config(config: &CourierConfig) -> Result<Self, CourierError> {
        let engine = &config.engine;
        let storage_channel = config.token.storage_channel_id.ok_or_else(|| {
            CourierError::Config("token.storage_channel_id must be set".into())
        })?;
        let handle = config
            .token
            .vending_handle
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| CourierError::Config("token.vending_handle must be set".into()))?;

        Ok(Self {
            response_timeout: engine.response_timeout(),
            mutation_delay: engine.mutation_delay(),
            edit_grace: engine.edit_grace(),
            recent_scan_depth: engine.recent_scan_depth,
            history_limit: engine.history_limit,
            max_link_retries: engine.max_link_retries,
            retry_delay: engine.retry_delay(),
            join_retry_limit: engine.join_retry_limit,
            max_concurrent_links: engine.max_concurrent_links.max(1),
            storage_channel,
            codec: TokenCodec::new(storage_channel)?,
            access_links: AccessLinkFormat::new(&config.links.platform_host, handle),
        })
    }
}

/// What `resolve` produced for one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Freshly resolved in this call.
    Resolved(Vec<String>),
    /// Served from an earlier completed resolution.
    Cached(Vec<String>),
    /// Another task holds the claim.
    InFlight,
    /// Nothing found, or the link could not be resolved. See the logs.
    Empty,
}

impl Resolution {
    pub fn tokens(&self) -> &[String] {
        match self {
            Resolution::Resolved(tokens) | Resolution::Cached(tokens) => tokens,
            Resolution::InFlight | Resolution::Empty => &[],
        }
    }

    /// Short outcome name used in logs, metrics and `serve` output.
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Resolved(_) => "resolved",
            Resolution::Cached(_) => "cached",
            Resolution::InFlight => "in_flight",
            Resolution::Empty => "empty",
        }
    }
}

pub struct Engine {
    platform: Arc<dyn MessagingPlatform>,
    dedup: Arc<DedupController>,
    patterns: LinkPatterns,
    joiner: GateJoiner,
    relocator: MediaRelocator,
    settings: EngineSettings,
}

impl Engine {
    /// Build an engine. `storage` backs dedup records when
    /// `storage.durable_dedup` is on; otherwise dedup lives in memory only.
    pub fn new(
        platform: Arc<dyn MessagingPlatform>,
        storage: Option<Arc<dyn StorageAdapter>>,
        config: &CourierConfig,
    ) -> Result<Self, CourierError> {
        let settings = EngineSettings::from_config(config)?;
        let store = storage.filter(|_| config.storage.durable_dedup);
        let dedup = Arc::new(DedupController::with_store(store));

        Ok(Self {
            patterns: LinkPatterns::new(&config.links)?,
            joiner: GateJoiner::new(
                Arc::clone(&platform),
                settings.mutation_delay,
                settings.join_retry_limit,
            ),
            relocator: MediaRelocator::new(
                Arc::clone(&platform),
                Arc::clone(&dedup),
                settings.storage_channel,
            ),
            platform,
            dedup,
            settings,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn dedup(&self) -> &Arc<DedupController> {
        &self.dedup
    }

    pub fn parse_link(&self, raw: &str) -> Result<SourceLink, CourierError> {
        self.patterns.parse_source_link(raw)
    }

    /// Resolve `link` and every nested vending-bot link it surfaces.
    ///
    /// Returns the root link's result; nested results are logged. Only
    /// credential failures are errors.
    pub async fn resolve(&self, link: &SourceLink) -> Result<Resolution, CourierError> {
        let tree = self.resolve_tree(link).await?;
        Ok(tree
            .into_iter()
            .next()
            .map(|(_, resolution)| resolution)
            .unwrap_or(Resolution::Empty))
    }

    /// Resolve `link`, then drain its nested links one by one. The root comes
    /// first in the result.
    pub async fn resolve_tree(
        &self,
        link: &SourceLink,
    ) -> Result<Vec<(SourceLink, Resolution)>, CourierError> {
        let mut queue = LinkQueue::new(link);
        let root = self.resolve_one(link, &mut queue).await?;
        let mut results = vec![(link.clone(), root)];

        while let Some(nested) = queue.pop() {
            let resolution = self.resolve_one(&nested, &mut queue).await?;
            info!(
                root = %link,
                link = %nested,
                outcome = resolution.label(),
                tokens = resolution.tokens().len(),
                "nested link finished"
            );
            results.push((nested, resolution));
        }
        Ok(results)
    }

    /// Resolve several links at once, at most `max_concurrent_links` at a
    /// time. Results come back in input order.
    ///
    /// The first credential failure stops the batch: links still running
    /// are dropped and links not yet started are never opened.
    pub async fn resolve_all(&self, links: &[SourceLink]) -> Result<Vec<Resolution>, CourierError> {
        stream::iter(links)
            .map(|link| self.resolve(link))
            .buffered(self.settings.max_concurrent_links)
            .try_collect()
            .await
    }

    async fn resolve_one(
        &self,
        link: &SourceLink,
        queue: &mut LinkQueue,
    ) -> Result<Resolution, CourierError> {
        let resolution = match self.run_claimed(link, queue).await {
            Ok(resolution) => resolution,
            Err(e) => {
                metrics::counter!("courier_links_total", "outcome" => "fatal").increment(1);
                return Err(e);
            }
        };
        metrics::counter!("courier_links_total", "outcome" => resolution.label()).increment(1);
        Ok(resolution)
    }

    async fn run_claimed(
        &self,
        link: &SourceLink,
        queue: &mut LinkQueue,
    ) -> Result<Resolution, CourierError> {
        let guard = match self.dedup.claim_link(link.raw()).await? {
            LinkClaim::Completed(record) => {
                info!(link = %link, tokens = record.access_tokens.len(), "link already resolved");
                return Ok(Resolution::Cached(record.access_tokens));
            }
            LinkClaim::InFlight => {
                info!(link = %link, "link is already being resolved");
                return Ok(Resolution::InFlight);
            }
            LinkClaim::Claimed(guard) => guard,
        };

        let ctx = RunContext {
            platform: self.platform.as_ref(),
            patterns: &self.patterns,
            joiner: &self.joiner,
            relocator: &self.relocator,
            settings: &self.settings,
        };

        let mut retries = 0;
        let report = loop {
            match LinkRun::new(&ctx, link, &mut *queue).execute().await {
                RunOutcome::Resolved(report) => break Some(report),
                RunOutcome::Retry { after, reason } if retries < self.settings.max_link_retries => {
                    retries += 1;
                    let wait = after.unwrap_or(self.settings.retry_delay);
                    warn!(
                        link = %link,
                        error = %reason,
                        attempt = retries,
                        wait_secs = wait.as_secs(),
                        "link run failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                RunOutcome::Retry { reason, .. } => {
                    warn!(link = %link, error = %reason, "giving up after retries");
                    break None;
                }
                RunOutcome::Abort(reason) => {
                    warn!(link = %link, error = %reason, "link aborted");
                    break None;
                }
                RunOutcome::Fatal(reason) => {
                    error!(link = %link, error = %reason, "fatal platform error");
                    return Err(reason);
                }
            }
        };

        let Some(RunReport {
            tokens,
            fingerprints,
        }) = report.filter(|r| !r.tokens.is_empty())
        else {
            info!(link = %link, "no media found");
            return Ok(Resolution::Empty);
        };

        let record = LinkRecord {
            original_link: link.raw().to_string(),
            access_tokens: tokens.clone(),
            media_fingerprints: fingerprints,
            resolved_at: Utc::now().to_rfc3339(),
        };
        if let Err(e) = guard.complete(record).await {
            warn!(link = %link, error = %e, "resolved but not recorded");
        }
        info!(link = %link, tokens = tokens.len(), "link resolved");
        Ok(Resolution::Resolved(tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{Button, ResponseNode};
    use courier_storage::SqliteStorage;
    use courier_test_utils::fixtures::video;
    use courier_test_utils::{BotScript, PlatformCall, ScriptedError, ScriptedPlatform};
    use tracing_test::traced_test;

    fn config() -> CourierConfig {
        let mut config = CourierConfig::default();
        config.engine.mutation_delay_ms = 0;
        config.engine.edit_grace_ms = 0;
        config.engine.retry_delay_secs = 5;
        config.token.storage_channel_id = Some(-1002818242381);
        config.token.vending_handle = Some("vault_bot".into());
        config
    }

    fn engine(platform: &Arc<ScriptedPlatform>) -> Engine {
        Engine::new(platform.clone(), None, &config()).unwrap()
    }

    async fn video_bot(platform: &ScriptedPlatform, bot: &str, id: i64) {
        platform
            .script_bot(
                bot,
                BotScript::replying(ResponseNode::text(500, "here").with_media(video(id))),
            )
            .await;
    }

    async fn durable_engine(platform: &Arc<ScriptedPlatform>, config: &CourierConfig) -> Engine {
        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await.unwrap();
        let storage: Arc<dyn StorageAdapter> = Arc::new(storage);
        Engine::new(platform.clone(), Some(storage), config).unwrap()
    }

    #[test]
    fn settings_require_token_section() {
        let mut config = config();
        config.token.vending_handle = None;
        assert!(matches!(
            EngineSettings::from_config(&config),
            Err(CourierError::Config(_))
        ));

        let mut config = self::config();
        config.token.storage_channel_id = None;
        assert!(EngineSettings::from_config(&config).is_err());
    }

    #[test]
    fn resolve_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let platform = Arc::new(ScriptedPlatform::new());
        let engine = engine(&platform);
        let link = SourceLink::new("https://t.me/files_bot?start=a", "files_bot");
        let resolving = engine.resolve(&link);
        assert_send(&resolving);
    }

    #[tokio::test]
    async fn second_resolve_hits_the_cache() {
        let platform = Arc::new(ScriptedPlatform::new());
        video_bot(&platform, "files_bot", 1).await;
        let engine = engine(&platform);
        let link = engine.parse_link("https://t.me/files_bot?start=a").unwrap();

        let first = engine.resolve(&link).await.unwrap();
        let calls = platform.calls().await.len();
        let second = engine.resolve(&link).await.unwrap();

        assert!(matches!(first, Resolution::Resolved(_)));
        assert_eq!(second, Resolution::Cached(first.tokens().to_vec()));
        assert_eq!(platform.calls().await.len(), calls);
    }

    #[tokio::test]
    async fn zero_tokens_release_the_claim() {
        let platform = Arc::new(ScriptedPlatform::new());
        platform
            .script_bot("files_bot", BotScript::replying(ResponseNode::text(500, "nothing here")))
            .await;
        let engine = engine(&platform);
        let link = engine.parse_link("https://t.me/files_bot?start=a").unwrap();

        assert_eq!(engine.resolve(&link).await.unwrap(), Resolution::Empty);
        assert!(!engine.dedup().is_in_flight(link.raw()));
        assert_eq!(engine.resolve(&link).await.unwrap(), Resolution::Empty);
        assert_eq!(
            platform.count(|c| matches!(c, PlatformCall::OpenConversation { .. })).await,
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_run_is_retried_after_signalled_wait() {
        let platform = Arc::new(ScriptedPlatform::new());
        video_bot(&platform, "files_bot", 1).await;
        platform
            .fail_command("files_bot", ScriptedError::RateLimited(Duration::from_secs(30)))
            .await;
        let engine = engine(&platform);
        let link = engine.parse_link("https://t.me/files_bot?start=a").unwrap();

        let started = tokio::time::Instant::now();
        let resolution = engine.resolve(&link).await.unwrap();
        assert!(matches!(resolution, Resolution::Resolved(ref t) if t.len() == 1));
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert_eq!(
            platform.count(|c| matches!(c, PlatformCall::OpenConversation { .. })).await,
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let platform = Arc::new(ScriptedPlatform::new());
        video_bot(&platform, "files_bot", 1).await;
        for _ in 0..10 {
            platform
                .fail_command("files_bot", ScriptedError::Timeout)
                .await;
        }
        let engine = engine(&platform);
        let link = engine.parse_link("https://t.me/files_bot?start=a").unwrap();

        assert_eq!(engine.resolve(&link).await.unwrap(), Resolution::Empty);
        let max = engine.settings().max_link_retries as usize;
        assert_eq!(
            platform.count(|c| matches!(c, PlatformCall::OpenConversation { .. })).await,
            max + 1
        );
    }

    #[tokio::test]
    async fn fatal_errors_propagate_and_release() {
        let platform = Arc::new(ScriptedPlatform::new());
        video_bot(&platform, "files_bot", 1).await;
        platform
            .fail_command("files_bot", ScriptedError::Unauthorized)
            .await;
        let engine = engine(&platform);
        let link = engine.parse_link("https://t.me/files_bot?start=a").unwrap();

        let err = engine.resolve(&link).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(!engine.dedup().is_in_flight(link.raw()));
    }

    #[tokio::test]
    async fn nested_links_resolve_after_the_parent() {
        let platform = Arc::new(ScriptedPlatform::new());
        let parent = ResponseNode::text(500, "part one")
            .with_media(video(1))
            .with_buttons(vec![vec![Button::url("Part two", "https://t.me/mirror_bot?start=b")]]);
        platform
            .script_bot("files_bot", BotScript::replying(parent))
            .await;
        video_bot(&platform, "mirror_bot", 2).await;
        let engine = engine(&platform);
        let link = engine.parse_link("https://t.me/files_bot?start=a").unwrap();

        let tree = engine.resolve_tree(&link).await.unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].0, link);
        assert_eq!(tree[1].0.bot(), "mirror_bot");
        assert!(tree.iter().all(|(_, r)| r.tokens().len() == 1));

        let calls = platform.calls().await;
        let parent_closed = calls
            .iter()
            .position(|c| matches!(c, PlatformCall::CloseConversation { bot } if bot == "files_bot"));
        let nested_opened = calls
            .iter()
            .position(|c| matches!(c, PlatformCall::OpenConversation { bot } if bot == "mirror_bot"));
        assert!(parent_closed < nested_opened);
    }

    #[tokio::test]
    async fn mutually_linked_bots_terminate() {
        let platform = Arc::new(ScriptedPlatform::new());
        platform
            .script_bot(
                "a_bot",
                BotScript::replying(
                    ResponseNode::text(500, "see b")
                        .with_buttons(vec![vec![Button::url("b", "https://t.me/b_bot?start=x")]]),
                ),
            )
            .await;
        platform
            .script_bot(
                "b_bot",
                BotScript::replying(
                    ResponseNode::text(500, "see a")
                        .with_buttons(vec![vec![Button::url("a", "https://t.me/a_bot?start=x")]]),
                ),
            )
            .await;
        let engine = engine(&platform);
        let link = engine.parse_link("https://t.me/a_bot?start=x").unwrap();

        let tree = engine.resolve_tree(&link).await.unwrap();
        assert_eq!(tree.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resolves_open_one_conversation() {
        let platform = Arc::new(ScriptedPlatform::new());
        video_bot(&platform, "files_bot", 1).await;
        platform.set_response_delay(Duration::from_millis(50)).await;
        let engine = Arc::new(engine(&platform));
        let link = engine.parse_link("https://t.me/files_bot?start=a").unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = Arc::clone(&engine);
            let link = link.clone();
            handles.push(tokio::spawn(async move { engine.resolve(&link).await.unwrap() }));
        }
        let mut resolved = 0;
        for h in handles {
            if matches!(h.await.unwrap(), Resolution::Resolved(_)) {
                resolved += 1;
            }
        }
        assert_eq!(resolved, 1);
        assert_eq!(
            platform.count(|c| matches!(c, PlatformCall::OpenConversation { .. })).await,
            1
        );
    }

    #[tokio::test]
    async fn resolve_all_keeps_input_order() {
        let platform = Arc::new(ScriptedPlatform::new());
        video_bot(&platform, "one_bot", 1).await;
        video_bot(&platform, "two_bot", 2).await;
        let engine = engine(&platform);
        let links = vec![
            engine.parse_link("https://t.me/one_bot?start=a").unwrap(),
            engine.parse_link("https://t.me/two_bot?start=a").unwrap(),
        ];

        let results = engine.resolve_all(&links).await.unwrap();
        let tokens: Vec<_> = results.iter().map(|r| r.tokens().to_vec()).collect();
        assert_eq!(tokens.len(), 2);
        assert_ne!(tokens[0], tokens[1]);
    }

    #[tokio::test]
    async fn resolve_all_stops_at_the_first_fatal_error() {
        let platform = Arc::new(ScriptedPlatform::new());
        video_bot(&platform, "one_bot", 1).await;
        video_bot(&platform, "two_bot", 2).await;
        platform
            .fail_command("one_bot", ScriptedError::Unauthorized)
            .await;
        let mut config = config();
        config.engine.max_concurrent_links = 1;
        let engine = Engine::new(platform.clone(), None, &config).unwrap();
        let links = vec![
            engine.parse_link("https://t.me/one_bot?start=a").unwrap(),
            engine.parse_link("https://t.me/two_bot?start=a").unwrap(),
        ];

        let err = engine.resolve_all(&links).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            platform
                .count(|c| matches!(c, PlatformCall::OpenConversation { bot } if bot == "two_bot"))
                .await,
            0
        );
        assert!(platform.uploads().await.is_empty());
    }

    #[tokio::test]
    async fn durable_records_survive_engine_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.storage.database_path = dir.path().join("engine.db").to_string_lossy().into_owned();

        let platform = Arc::new(ScriptedPlatform::new());
        video_bot(&platform, "files_bot", 1).await;

        let first = durable_engine(&platform, &config).await;
        let link = first.parse_link("https://t.me/files_bot?start=a").unwrap();
        let resolved = first.resolve(&link).await.unwrap();
        drop(first);

        let second = durable_engine(&platform, &config).await;
        assert_eq!(
            second.resolve(&link).await.unwrap(),
            Resolution::Cached(resolved.tokens().to_vec())
        );
        assert_eq!(
            platform.count(|c| matches!(c, PlatformCall::OpenConversation { .. })).await,
            1
        );
    }

    #[traced_test]
    #[tokio::test]
    async fn aborted_links_are_logged() {
        let platform = Arc::new(ScriptedPlatform::new());
        video_bot(&platform, "files_bot", 1).await;
        platform
            .fail_command("files_bot", ScriptedError::AccessDenied)
            .await;
        let engine = engine(&platform);
        let link = engine.parse_link("https://t.me/files_bot?start=a").unwrap();

        assert_eq!(engine.resolve(&link).await.unwrap(), Resolution::Empty);
        assert!(logs_contain("link aborted"));
    }
}
