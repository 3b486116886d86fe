// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Link resolution state machine.
//!
//! One [`LinkRun`] drives a single conversation for a claimed link:
//!
//! ```text
//! Idle -> Claimed -> AwaitingResponse -> GateCheck -> ButtonTraversal
//!      -> MediaExtraction -> Completed | Failed
//! ```
//!
//! The run never retries on its own. It ends in a typed [`RunOutcome`] and
//! the engine decides what happens next.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use courier_core::{
    ButtonKind, CourierError, ErrorClass, Locator, MediaAsset, MediaFingerprint,
    MessagingPlatform, RelocatedAsset, ResponseNode, SourceLink,
};
use strum::Display;
use tracing::{debug, info, warn};

use crate::engine::EngineSettings;
use crate::extract::{LinkPatterns, UrlTarget};
use crate::gate::GateJoiner;
use crate::queue::LinkQueue;
use crate::relocation::MediaRelocator;
use crate::session::ConversationSession;

/// Nesting limit for menus revealed by clicking payload buttons.
const MAX_TRAVERSAL_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LinkState {
    Idle,
    Claimed,
    AwaitingResponse,
    GateCheck,
    ButtonTraversal,
    MediaExtraction,
    Completed,
    Failed,
}

/// What a completed run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Access links, one per distinct relocated asset.
    pub tokens: Vec<String>,
    pub fingerprints: Vec<MediaFingerprint>,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// The run finished; the report may be empty.
    Resolved(RunReport),
    /// Transient failure. `after` is the platform-signalled wait, if any.
    Retry {
        after: Option<Duration>,
        reason: CourierError,
    },
    /// This link cannot be resolved; do not retry.
    Abort(CourierError),
    /// Operator credentials are gone; stop the engine.
    Fatal(CourierError),
}

impl RunOutcome {
    fn from_error(err: CourierError) -> Self {
        match err.class() {
            ErrorClass::Fatal => RunOutcome::Fatal(err),
            ErrorClass::Retryable => RunOutcome::Retry {
                after: err.retry_after(),
                reason: err,
            },
            ErrorClass::AccessDenied | ErrorClass::PermanentGate | ErrorClass::Other => {
                RunOutcome::Abort(err)
            }
        }
    }
}

/// Engine components a run borrows.
pub struct RunContext<'a> {
    pub platform: &'a dyn MessagingPlatform,
    pub patterns: &'a LinkPatterns,
    pub joiner: &'a GateJoiner,
    pub relocator: &'a MediaRelocator,
    pub settings: &'a EngineSettings,
}

pub struct LinkRun<'a> {
    ctx: &'a RunContext<'a>,
    link: &'a SourceLink,
    queue: &'a mut LinkQueue,
    state: LinkState,
    report: RunReport,
    minted: HashSet<MediaFingerprint>,
}

impl<'a> LinkRun<'a> {
    pub fn new(ctx: &'a RunContext<'a>, link: &'a SourceLink, queue: &'a mut LinkQueue) -> Self {
        Self {
            ctx,
            link,
            queue,
            state: LinkState::Idle,
            report: RunReport::default(),
            minted: HashSet::new(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Run the conversation to a terminal state. The session is closed on
    /// every path.
    pub async fn execute(mut self) -> RunOutcome {
        self.transition(LinkState::Claimed);
        let settings = self.ctx.settings;

        let mut session = match ConversationSession::open(
            self.ctx.platform,
            self.link.bot(),
            settings.response_timeout,
            settings.history_limit,
        )
        .await
        {
            Ok(session) => session,
            Err(e) => return self.fail(e),
        };

        let result = self.drive(&mut session).await;
        if let Err(e) = session.close().await {
            warn!(link = %self.link, error = %e, "failed to close conversation");
        }

        match result {
            Ok(()) => {
                self.transition(LinkState::Completed);
                RunOutcome::Resolved(self.report)
            }
            Err(e) => self.fail(e),
        }
    }

    async fn drive(&mut self, session: &mut ConversationSession) -> Result<(), CourierError> {
        let command = self.link.command().to_string();

        self.transition(LinkState::AwaitingResponse);
        session.send(&command).await?;
        let mut prompt = session.await_response().await?;

        if self.ctx.patterns.is_gate_prompt(&prompt.text) {
            self.transition(LinkState::GateCheck);
            let bot = session.bot().to_string();
            if self.satisfy_gates(&prompt, &bot).await? {
                debug!(link = %self.link, "gates satisfied, resending command");
                session.send(&command).await?;
                prompt = session.await_response().await?;
            }
        }

        self.transition(LinkState::ButtonTraversal);
        self.traverse(session, prompt.clone()).await?;

        self.transition(LinkState::MediaExtraction);
        if self.report.tokens.is_empty() {
            self.scan_recent(session).await?;
        }
        self.recheck_edited(session, &prompt).await
    }

    /// Join every channel the prompt names. True if any join succeeded.
    async fn satisfy_gates(&self, prompt: &ResponseNode, bot: &str) -> Result<bool, CourierError> {
        let references = self.ctx.patterns.channel_references(&prompt.text, bot);
        if references.is_empty() {
            debug!(link = %self.link, "gate language without channel references");
        }
        let mut joined_any = false;
        for reference in &references {
            if self.ctx.joiner.join(reference).await?.is_success() {
                joined_any = true;
            }
        }
        Ok(joined_any)
    }

    /// Walk the button grid of `root` and the menus its buttons open.
    async fn traverse(
        &mut self,
        session: &mut ConversationSession,
        root: ResponseNode,
    ) -> Result<(), CourierError> {
        let bot = session.bot().to_string();
        let mut pending = VecDeque::from([(root, 0usize)]);

        while let Some((node, depth)) = pending.pop_front() {
            // Once media turns up in a node, its remaining payload buttons
            // are skipped. Url buttons are still followed.
            let mut found = match &node.media {
                Some(media) => self.extract(media).await?,
                None => false,
            };

            for button in node.buttons_in_order() {
                match &button.kind {
                    ButtonKind::Url { url } => self.follow_url(url, &bot).await?,
                    ButtonKind::Payload { .. } if found => {}
                    ButtonKind::Payload { data } => {
                        let Some(response) = self.click(session, &node, data).await? else {
                            continue;
                        };
                        match &response.media {
                            Some(media) => found = self.extract(media).await?,
                            None if !response.buttons.is_empty() && depth + 1 < MAX_TRAVERSAL_DEPTH => {
                                pending.push_back((response, depth + 1));
                            }
                            None => {}
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn follow_url(&mut self, url: &str, bot: &str) -> Result<(), CourierError> {
        match self.ctx.patterns.classify_url(url) {
            UrlTarget::Gate(reference) if !reference.is_handle(bot) => {
                self.ctx.joiner.join(&reference).await?;
            }
            UrlTarget::VendingBot(nested) => {
                if self.queue.push(nested.clone()) {
                    info!(link = %self.link, nested = %nested, "queued nested vending-bot link");
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Press a payload button. A rate-limited click is retried once after
    /// the signalled wait and skipped if the platform still refuses it.
    async fn click(
        &self,
        session: &mut ConversationSession,
        node: &ResponseNode,
        payload: &[u8],
    ) -> Result<Option<ResponseNode>, CourierError> {
        let wait = match self.press(session, node, payload).await {
            Ok(response) => return Ok(Some(response)),
            Err(e) => e.retry_after().ok_or(e)?,
        };
        warn!(link = %self.link, wait_secs = wait.as_secs(), "rate limited on click, retrying");
        tokio::time::sleep(wait).await;

        match self.press(session, node, payload).await {
            Ok(response) => Ok(Some(response)),
            Err(e) if e.retry_after().is_some() => {
                warn!(link = %self.link, error = %e, "click still rate limited, skipping button");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn press(
        &self,
        session: &mut ConversationSession,
        node: &ResponseNode,
        payload: &[u8],
    ) -> Result<ResponseNode, CourierError> {
        let result = session.click(node, payload).await;
        let delay = self.ctx.settings.mutation_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }

    /// Bot messages newer than this run's first command, newest first.
    async fn scan_recent(&mut self, session: &mut ConversationSession) -> Result<(), CourierError> {
        let after = session.first_command_id().unwrap_or(i64::MIN);
        let recent = self
            .ctx
            .platform
            .recent_messages(session.bot(), self.ctx.settings.recent_scan_depth)
            .await?;

        for message in recent
            .iter()
            .filter(|m| m.id > after && !m.outgoing)
        {
            if let Some(media) = &message.media {
                self.extract(media).await?;
            }
        }
        Ok(())
    }

    /// Give the bot a moment to edit the prompt in place, then rescan once.
    async fn recheck_edited(
        &mut self,
        session: &mut ConversationSession,
        prompt: &ResponseNode,
    ) -> Result<(), CourierError> {
        let grace = self.ctx.settings.edit_grace;
        if !grace.is_zero() {
            tokio::time::sleep(grace).await;
        }

        let edited = match self.ctx.platform.edited_version_of(session.bot(), prompt).await {
            Ok(Some(edited)) if prompt.differs_from(&edited) => edited,
            Ok(_) => return Ok(()),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(link = %self.link, error = %e, "could not re-read prompt");
                return Ok(());
            }
        };

        info!(link = %self.link, message_id = edited.id, "prompt was edited, rescanning");
        self.transition(LinkState::ButtonTraversal);
        self.traverse(session, edited).await?;
        self.transition(LinkState::MediaExtraction);
        if self.report.tokens.is_empty() {
            self.scan_recent(session).await?;
        }
        Ok(())
    }

    /// Relocate `media` and mint its token. Media-level failures are skipped
    /// unless they should end the run.
    async fn extract(&mut self, media: &MediaAsset) -> Result<bool, CourierError> {
        match self.ctx.relocator.relocate(media).await {
            Ok(relocation) => {
                self.mint(&relocation.asset);
                Ok(true)
            }
            Err(e) if matches!(e.class(), ErrorClass::Fatal | ErrorClass::Retryable) => Err(e),
            Err(e) => {
                warn!(link = %self.link, fingerprint = %media.fingerprint, error = %e, "media relocation failed, skipping");
                Ok(false)
            }
        }
    }

    fn mint(&mut self, asset: &RelocatedAsset) {
        if !self.minted.insert(asset.fingerprint) {
            return;
        }
        let settings = self.ctx.settings;
        let token = settings.codec.encode(&Locator::single(asset.message_index));
        self.report.tokens.push(settings.access_links.link(&token));
        self.report.fingerprints.push(asset.fingerprint);
        debug!(link = %self.link, fingerprint = %asset.fingerprint, message_index = asset.message_index, "token minted");
    }

    fn fail(&mut self, err: CourierError) -> RunOutcome {
        self.transition(LinkState::Failed);
        RunOutcome::from_error(err)
    }

    fn transition(&mut self, next: LinkState) {
        debug!(link = %self.link, from = %self.state, to = %next, "state transition");
        self.state = next;
    }
}
