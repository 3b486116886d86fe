// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted messaging platform for deterministic testing.
//!
//! `ScriptedPlatform` implements `MessagingPlatform` with per-bot scripts,
//! a membership book, injectable failures and a log of every call made.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use courier_core::{
    AdapterType, Conversation, CourierError, DownloadedMedia, HealthStatus, MediaAsset,
    MediaFingerprint, MessagingPlatform, PluginAdapter, ResponseNode, UploadRequest,
};

/// First id handed out to commands sent by the operator account.
const FIRST_COMMAND_ID: i64 = 100;

/// Failure to inject into the next matching platform call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedError {
    AlreadyMember,
    InviteInvalid,
    InviteExpired,
    ChannelPrivate,
    RateLimited(Duration),
    Unauthorized,
    AccessDenied,
    Timeout,
}

impl ScriptedError {
    fn into_error(self) -> CourierError {
        match self {
            ScriptedError::AlreadyMember => CourierError::AlreadyMember,
            ScriptedError::InviteInvalid => CourierError::InviteInvalid("INVITE_HASH_INVALID".into()),
            ScriptedError::InviteExpired => CourierError::InviteExpired("INVITE_HASH_EXPIRED".into()),
            ScriptedError::ChannelPrivate => CourierError::ChannelPrivate("CHANNEL_PRIVATE".into()),
            ScriptedError::RateLimited(retry_after) => CourierError::RateLimited { retry_after },
            ScriptedError::Unauthorized => CourierError::Unauthorized("AUTH_KEY_UNREGISTERED".into()),
            ScriptedError::AccessDenied => CourierError::AccessDenied("USER_BANNED_IN_CHANNEL".into()),
            ScriptedError::Timeout => CourierError::Timeout {
                duration: Duration::from_secs(30),
            },
        }
    }
}

/// One call made against the platform, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    OpenConversation { bot: String },
    SendCommand { bot: String, text: String },
    AwaitResponse { bot: String },
    Click { bot: String, message_id: i64, payload: Vec<u8> },
    JoinPublic { handle: String },
    QueryMembership { handle: String },
    RedeemInvite { invite_hash: String },
    RecentMessages { bot: String, limit: usize },
    EditedVersion { bot: String, message_id: i64 },
    Download { fingerprint: MediaFingerprint },
    Upload { storage_channel: i64 },
    CloseConversation { bot: String },
}

/// A completed upload into the storage channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub storage_channel: i64,
    pub message_index: u64,
    pub request: UploadRequest,
}

/// How one vending bot behaves.
///
/// Every command gets `reply`, unless the bot is gated and the operator
/// account is missing one of the required memberships, in which case it
/// gets the gate prompt instead.
#[derive(Debug, Clone, Default)]
pub struct BotScript {
    reply: Option<ResponseNode>,
    gate: Option<ResponseNode>,
    required_channels: Vec<String>,
    required_invites: Vec<String>,
    clicks: HashMap<Vec<u8>, ResponseNode>,
    recent: Vec<ResponseNode>,
    edits: HashMap<i64, ResponseNode>,
}

impl BotScript {
    pub fn replying(reply: ResponseNode) -> Self {
        Self {
            reply: Some(reply),
            ..Self::default()
        }
    }

    /// A bot that never answers.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn gated_by(mut self, prompt: ResponseNode) -> Self {
        self.gate = Some(prompt);
        self
    }

    pub fn requires_channel(mut self, handle: &str) -> Self {
        self.required_channels.push(handle.to_lowercase());
        self
    }

    pub fn requires_invite(mut self, invite_hash: &str) -> Self {
        self.required_invites.push(invite_hash.to_string());
        self
    }

    pub fn on_click(mut self, payload: &[u8], response: ResponseNode) -> Self {
        self.clicks.insert(payload.to_vec(), response);
        self
    }

    /// Chat history returned by `recent_messages`, newest first.
    pub fn with_recent(mut self, messages: Vec<ResponseNode>) -> Self {
        self.recent = messages;
        self
    }

    /// What message `id` looks like when re-read.
    pub fn with_edit(mut self, id: i64, edited: ResponseNode) -> Self {
        self.edits.insert(id, edited);
        self
    }
}

#[derive(Default)]
struct PlatformState {
    bots: HashMap<String, BotScript>,
    memberships: HashSet<String>,
    redeemed: HashSet<String>,
    calls: Vec<PlatformCall>,
    command_failures: HashMap<String, VecDeque<ScriptedError>>,
    join_failures: HashMap<String, VecDeque<ScriptedError>>,
    invite_failures: HashMap<String, VecDeque<ScriptedError>>,
    click_failures: HashMap<String, VecDeque<ScriptedError>>,
    upload_failures: VecDeque<ScriptedError>,
    uploads: Vec<UploadRecord>,
    downloads: Vec<PathBuf>,
    next_command_id: i64,
    response_delay: Duration,
}

impl PlatformState {
    fn bot_reply(&self, bot: &str) -> Option<ResponseNode> {
        let script = self.bots.get(bot)?;
        let gated = script
            .required_channels
            .iter()
            .any(|h| !self.memberships.contains(h))
            || script
                .required_invites
                .iter()
                .any(|h| !self.redeemed.contains(h));
        if gated && script.gate.is_some() {
            script.gate.clone()
        } else {
            script.reply.clone()
        }
    }
}

fn next_failure(
    queues: &mut HashMap<String, VecDeque<ScriptedError>>,
    key: &str,
) -> Option<ScriptedError> {
    queues.get_mut(key).and_then(VecDeque::pop_front)
}

/// A scripted messaging platform for testing.
pub struct ScriptedPlatform {
    state: Arc<Mutex<PlatformState>>,
}

impl ScriptedPlatform {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PlatformState {
                next_command_id: FIRST_COMMAND_ID,
                ..PlatformState::default()
            })),
        }
    }

    pub async fn script_bot(&self, bot: &str, script: BotScript) {
        self.state.lock().await.bots.insert(bot.to_string(), script);
    }

    /// Fail the next command sent to `bot`. Failures queue up.
    pub async fn fail_command(&self, bot: &str, error: ScriptedError) {
        let mut state = self.state.lock().await;
        state
            .command_failures
            .entry(bot.to_string())
            .or_default()
            .push_back(error);
    }

    pub async fn fail_join(&self, handle: &str, error: ScriptedError) {
        let mut state = self.state.lock().await;
        state
            .join_failures
            .entry(handle.to_lowercase())
            .or_default()
            .push_back(error);
    }

    pub async fn fail_invite(&self, invite_hash: &str, error: ScriptedError) {
        let mut state = self.state.lock().await;
        state
            .invite_failures
            .entry(invite_hash.to_string())
            .or_default()
            .push_back(error);
    }

    /// Fail the next button click in a conversation with `bot`.
    pub async fn fail_click(&self, bot: &str, error: ScriptedError) {
        let mut state = self.state.lock().await;
        state
            .click_failures
            .entry(bot.to_string())
            .or_default()
            .push_back(error);
    }

    pub async fn fail_upload(&self, error: ScriptedError) {
        self.state.lock().await.upload_failures.push_back(error);
    }

    /// Delay before every bot response is delivered.
    pub async fn set_response_delay(&self, delay: Duration) {
        self.state.lock().await.response_delay = delay;
    }

    pub async fn add_membership(&self, handle: &str) {
        self.state.lock().await.memberships.insert(handle.to_lowercase());
    }

    pub async fn is_member(&self, handle: &str) -> bool {
        self.state.lock().await.memberships.contains(&handle.to_lowercase())
    }

    pub async fn has_redeemed(&self, invite_hash: &str) -> bool {
        self.state.lock().await.redeemed.contains(invite_hash)
    }

    pub async fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn count(&self, predicate: impl Fn(&PlatformCall) -> bool) -> usize {
        self.state.lock().await.calls.iter().filter(|c| predicate(c)).count()
    }

    pub async fn uploads(&self) -> Vec<UploadRecord> {
        self.state.lock().await.uploads.clone()
    }

    /// Every local path a download was written to.
    pub async fn downloaded_paths(&self) -> Vec<PathBuf> {
        self.state.lock().await.downloads.clone()
    }

    async fn record(&self, call: PlatformCall) {
        self.state.lock().await.calls.push(call);
    }
}

impl Default for ScriptedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for ScriptedPlatform {
    fn name(&self) -> &str {
        "scripted-platform"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Platform
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        Ok(())
    }
}

#[async_trait]
impl MessagingPlatform for ScriptedPlatform {
    async fn open_conversation(&self, bot: &str) -> Result<Box<dyn Conversation>, CourierError> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::OpenConversation {
            bot: bot.to_string(),
        });
        if !state.bots.contains_key(bot) {
            return Err(CourierError::AccessDenied("PEER_ID_INVALID".into()));
        }
        Ok(Box::new(ScriptedConversation {
            bot: bot.to_string(),
            state: Arc::clone(&self.state),
            inbox: VecDeque::new(),
        }))
    }

    async fn join_public_channel(&self, handle: &str) -> Result<(), CourierError> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::JoinPublic {
            handle: handle.to_string(),
        });
        let key = handle.to_lowercase();
        if let Some(err) = next_failure(&mut state.join_failures, &key) {
            return Err(err.into_error());
        }
        state.memberships.insert(key);
        Ok(())
    }

    async fn redeem_invite(&self, invite_hash: &str) -> Result<(), CourierError> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::RedeemInvite {
            invite_hash: invite_hash.to_string(),
        });
        if let Some(err) = next_failure(&mut state.invite_failures, invite_hash) {
            return Err(err.into_error());
        }
        state.redeemed.insert(invite_hash.to_string());
        Ok(())
    }

    async fn query_membership(&self, handle: &str) -> Result<bool, CourierError> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::QueryMembership {
            handle: handle.to_string(),
        });
        Ok(state.memberships.contains(&handle.to_lowercase()))
    }

    async fn recent_messages(
        &self,
        bot: &str,
        limit: usize,
    ) -> Result<Vec<ResponseNode>, CourierError> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::RecentMessages {
            bot: bot.to_string(),
            limit,
        });
        Ok(state
            .bots
            .get(bot)
            .map(|s| s.recent.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn edited_version_of(
        &self,
        bot: &str,
        node: &ResponseNode,
    ) -> Result<Option<ResponseNode>, CourierError> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::EditedVersion {
            bot: bot.to_string(),
            message_id: node.id,
        });
        let edited = state.bots.get(bot).and_then(|s| s.edits.get(&node.id)).cloned();
        Ok(Some(edited.unwrap_or_else(|| node.clone())))
    }

    async fn download_media(
        &self,
        asset: &MediaAsset,
        dir: &Path,
    ) -> Result<DownloadedMedia, CourierError> {
        self.record(PlatformCall::Download {
            fingerprint: asset.fingerprint,
        })
        .await;

        let path = dir.join(format!("{}.mp4", asset.fingerprint.media_id));
        let bytes = vec![0u8; asset.size.unwrap_or(1024) as usize];
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| CourierError::Media {
                message: "scripted download failed".into(),
                source: Some(Box::new(e)),
            })?;

        self.state.lock().await.downloads.push(path.clone());
        Ok(DownloadedMedia {
            path,
            bytes: bytes.len() as u64,
        })
    }

    async fn upload_media(
        &self,
        storage_channel: i64,
        path: &Path,
        request: &UploadRequest,
    ) -> Result<u64, CourierError> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::Upload { storage_channel });
        if let Some(err) = state.upload_failures.pop_front() {
            return Err(err.into_error());
        }
        if !path.is_file() {
            return Err(CourierError::Media {
                message: format!("upload source {} is missing", path.display()),
                source: None,
            });
        }

        let message_index = state.uploads.len() as u64 + 1;
        state.uploads.push(UploadRecord {
            storage_channel,
            message_index,
            request: request.clone(),
        });
        Ok(message_index)
    }
}

/// One open conversation. Replies wait in `inbox` until awaited.
struct ScriptedConversation {
    bot: String,
    state: Arc<Mutex<PlatformState>>,
    inbox: VecDeque<ResponseNode>,
}

impl ScriptedConversation {
    async fn deliver(&self, timeout: Duration, reply: Option<ResponseNode>) -> Result<ResponseNode, CourierError> {
        let delay = self.state.lock().await.response_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match reply {
            Some(node) => Ok(node),
            None => {
                tokio::time::sleep(timeout).await;
                Err(CourierError::Timeout { duration: timeout })
            }
        }
    }
}

#[async_trait]
impl Conversation for ScriptedConversation {
    fn bot(&self) -> &str {
        &self.bot
    }

    async fn send_command(&mut self, text: &str) -> Result<i64, CourierError> {
        let mut state = self.state.lock().await;
        state.calls.push(PlatformCall::SendCommand {
            bot: self.bot.clone(),
            text: text.to_string(),
        });
        if let Some(err) = next_failure(&mut state.command_failures, &self.bot) {
            return Err(err.into_error());
        }

        let id = state.next_command_id;
        state.next_command_id += 1;
        if let Some(reply) = state.bot_reply(&self.bot) {
            self.inbox.push_back(reply);
        }
        Ok(id)
    }

    async fn await_response(&mut self, timeout: Duration) -> Result<ResponseNode, CourierError> {
        self.state.lock().await.calls.push(PlatformCall::AwaitResponse {
            bot: self.bot.clone(),
        });
        let reply = self.inbox.pop_front();
        self.deliver(timeout, reply).await
    }

    async fn click_button(
        &mut self,
        node: &ResponseNode,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<ResponseNode, CourierError> {
        let reply = {
            let mut state = self.state.lock().await;
            state.calls.push(PlatformCall::Click {
                bot: self.bot.clone(),
                message_id: node.id,
                payload: payload.to_vec(),
            });
            if let Some(err) = next_failure(&mut state.click_failures, &self.bot) {
                return Err(err.into_error());
            }
            state
                .bots
                .get(&self.bot)
                .and_then(|s| s.clicks.get(payload))
                .cloned()
        };
        self.deliver(timeout, reply).await
    }

    async fn close(&mut self) -> Result<(), CourierError> {
        self.state.lock().await.calls.push(PlatformCall::CloseConversation {
            bot: self.bot.clone(),
        });
        Ok(())
    }
}
