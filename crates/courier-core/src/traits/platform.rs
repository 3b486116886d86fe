// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The conversational messaging platform as seen by the engine.
//!
//! Every call is a suspension point. Failures are reported through the
//! [`CourierError`] taxonomy; in particular a platform back-off request is
//! always [`CourierError::RateLimited`] carrying the wait duration.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CourierError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{DownloadedMedia, MediaAsset, ResponseNode, UploadRequest};

/// An open exchange with one vending bot.
#[async_trait]
pub trait Conversation: Send {
    /// The bot this conversation talks to.
    fn bot(&self) -> &str;

    /// Sends a text command and returns the id of the sent message.
    async fn send_command(&mut self, text: &str) -> Result<i64, CourierError>;

    /// Waits for the next message from the bot.
    ///
    /// Returns [`CourierError::Timeout`] when nothing arrives in time.
    async fn await_response(&mut self, timeout: Duration) -> Result<ResponseNode, CourierError>;

    /// Presses a payload button on `node` and returns the message it produced.
    async fn click_button(
        &mut self,
        node: &ResponseNode,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<ResponseNode, CourierError>;

    /// Releases the conversation. Called on every exit path.
    async fn close(&mut self) -> Result<(), CourierError>;
}

/// The operator account's view of the messaging platform.
#[async_trait]
pub trait MessagingPlatform: PluginAdapter {
    /// Opens a conversation with `bot`.
    async fn open_conversation(&self, bot: &str) -> Result<Box<dyn Conversation>, CourierError>;

    /// Joins a public channel by handle.
    async fn join_public_channel(&self, handle: &str) -> Result<(), CourierError>;

    /// Redeems a private invite hash.
    async fn redeem_invite(&self, invite_hash: &str) -> Result<(), CourierError>;

    /// Whether the operator account already belongs to the public channel.
    async fn query_membership(&self, handle: &str) -> Result<bool, CourierError>;

    /// The most recent messages in the chat with `bot`, newest first.
    async fn recent_messages(
        &self,
        bot: &str,
        limit: usize,
    ) -> Result<Vec<ResponseNode>, CourierError>;

    /// Re-reads `node` as it currently stands; `None` if it is gone.
    async fn edited_version_of(
        &self,
        bot: &str,
        node: &ResponseNode,
    ) -> Result<Option<ResponseNode>, CourierError>;

    /// Downloads the media bytes into `dir`.
    async fn download_media(
        &self,
        asset: &MediaAsset,
        dir: &Path,
    ) -> Result<DownloadedMedia, CourierError>;

    /// Publishes the file at `path` as a fresh upload in `storage_channel`
    /// and returns its message index there.
    async fn upload_media(
        &self,
        storage_channel: i64,
        path: &Path,
        request: &UploadRequest,
    ) -> Result<u64, CourierError>;
}
