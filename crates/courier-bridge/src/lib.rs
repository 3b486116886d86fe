// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging platform adapter backed by an HTTP session bridge.
//!
//! The bridge is a sidecar that owns the operator's user-account session
//! and exposes it as a small JSON API. This crate implements
//! [`MessagingPlatform`] on top of it. Media bytes stream straight to and
//! from disk; upload metadata travels as query parameters.

pub mod client;
pub mod types;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use courier_config::model::BridgeConfig;
use courier_core::{
    AdapterType, Conversation, CourierError, DownloadedMedia, HealthStatus, MediaAsset,
    MessagingPlatform, PluginAdapter, ResponseNode, UploadRequest,
};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::client::BridgeClient;
use crate::types::{
    ClickRequest, JoinRequest, Membership, OpenConversationRequest, OpenConversationResponse,
    RedeemRequest, SendCommandRequest, SentMessage, UploadResponse,
};

/// Platform adapter talking to the session bridge.
pub struct BridgePlatform {
    client: BridgeClient,
    request_timeout: Duration,
}

impl BridgePlatform {
    pub fn new(config: &BridgeConfig) -> Result<Self, CourierError> {
        let client = BridgeClient::new(config)?;
        info!(base_url = %config.base_url, "bridge platform initialized");
        Ok(Self {
            client,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }
}

fn media_error(message: &str, e: impl std::error::Error + Send + Sync + 'static) -> CourierError {
    CourierError::Media {
        message: message.to_string(),
        source: Some(Box::new(e)),
    }
}

#[async_trait]
impl PluginAdapter for BridgePlatform {
    fn name(&self) -> &str {
        "bridge"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Platform
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        let url = self.client.url(&["health"])?;
        match self.client.empty(self.client.get(url)).await {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) if e.is_fatal() => Ok(HealthStatus::Unhealthy(e.to_string())),
            Err(e) => Ok(HealthStatus::Degraded(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        Ok(())
    }
}

#[async_trait]
impl MessagingPlatform for BridgePlatform {
    async fn open_conversation(&self, bot: &str) -> Result<Box<dyn Conversation>, CourierError> {
        let url = self.client.url(&["conversations"])?;
        let opened: OpenConversationResponse = self
            .client
            .json(
                self.client.post(url).json(&OpenConversationRequest { bot }),
                self.request_timeout,
            )
            .await?;
        debug!(bot, conversation = %opened.conversation_id, "bridge conversation opened");
        Ok(Box::new(BridgeConversation {
            client: self.client.clone(),
            id: opened.conversation_id,
            bot: bot.to_string(),
            request_timeout: self.request_timeout,
            closed: false,
        }))
    }

    async fn join_public_channel(&self, handle: &str) -> Result<(), CourierError> {
        let url = self.client.url(&["channels", "join"])?;
        self.client
            .empty(self.client.post(url).json(&JoinRequest { handle }))
            .await
    }

    async fn redeem_invite(&self, invite_hash: &str) -> Result<(), CourierError> {
        let url = self.client.url(&["invites", "redeem"])?;
        self.client
            .empty(self.client.post(url).json(&RedeemRequest { invite_hash }))
            .await
    }

    async fn query_membership(&self, handle: &str) -> Result<bool, CourierError> {
        let url = self.client.url(&["channels", handle, "membership"])?;
        let membership: Membership = self
            .client
            .json(self.client.get(url), self.request_timeout)
            .await?;
        Ok(membership.member)
    }

    async fn recent_messages(
        &self,
        bot: &str,
        limit: usize,
    ) -> Result<Vec<ResponseNode>, CourierError> {
        let mut url = self.client.url(&["chats", bot, "messages"])?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        self.client
            .json(self.client.get(url), self.request_timeout)
            .await
    }

    async fn edited_version_of(
        &self,
        bot: &str,
        node: &ResponseNode,
    ) -> Result<Option<ResponseNode>, CourierError> {
        let id = node.id.to_string();
        let url = self.client.url(&["chats", bot, "messages", &id])?;
        self.client
            .optional_json(self.client.get(url), self.request_timeout)
            .await
    }

    async fn download_media(
        &self,
        asset: &MediaAsset,
        dir: &Path,
    ) -> Result<DownloadedMedia, CourierError> {
        let transfer = self.client.transfer_timeout();
        let url = self.client.url(&["media", "download"])?;
        let response = self
            .client
            .send(self.client.post(url).json(asset).timeout(transfer), transfer)
            .await?;

        let file_name = format!("{}.bin", asset.fingerprint.media_id);
        let path = dir.join(file_name);
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| media_error("failed to create download file", e))?;

        let mut bytes = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| media_error("download interrupted", e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| media_error("failed to write download", e))?;
            bytes += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| media_error("failed to flush download", e))?;

        if let Some(expected) = asset.size
            && expected != bytes
        {
            warn!(fingerprint = %asset.fingerprint, expected, bytes, "download size mismatch");
        }
        Ok(DownloadedMedia { path, bytes })
    }

    async fn upload_media(
        &self,
        storage_channel: i64,
        path: &Path,
        request: &UploadRequest,
    ) -> Result<u64, CourierError> {
        let transfer = self.client.transfer_timeout();
        let mut url = self.client.url(&["media", "upload"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("storage_channel", &storage_channel.to_string());
            query.append_pair(
                "supports_streaming",
                if request.metadata.supports_streaming { "true" } else { "false" },
            );
            if let Some(duration) = request.metadata.duration_secs {
                query.append_pair("duration", &duration.to_string());
            }
            if let Some(width) = request.metadata.width {
                query.append_pair("width", &width.to_string());
            }
            if let Some(height) = request.metadata.height {
                query.append_pair("height", &height.to_string());
            }
            if let Some(caption) = &request.caption {
                query.append_pair("caption", caption);
            }
            if let Some(name) = &request.file_name {
                query.append_pair("file_name", name);
            }
        }

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| media_error("failed to open upload file", e))?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

        let uploaded: UploadResponse = self
            .client
            .json(self.client.post(url).body(body).timeout(transfer), transfer)
            .await?;
        Ok(uploaded.message_index)
    }
}

/// A conversation held open on the bridge.
struct BridgeConversation {
    client: BridgeClient,
    id: String,
    bot: String,
    request_timeout: Duration,
    closed: bool,
}

#[async_trait]
impl Conversation for BridgeConversation {
    fn bot(&self) -> &str {
        &self.bot
    }

    async fn send_command(&mut self, text: &str) -> Result<i64, CourierError> {
        let url = self.client.url(&["conversations", &self.id, "messages"])?;
        let sent: SentMessage = self
            .client
            .json(
                self.client.post(url).json(&SendCommandRequest { text }),
                self.request_timeout,
            )
            .await?;
        Ok(sent.message_id)
    }

    async fn await_response(&mut self, timeout: Duration) -> Result<ResponseNode, CourierError> {
        let mut url = self.client.url(&["conversations", &self.id, "next"])?;
        url.query_pairs_mut()
            .append_pair("timeout_secs", &timeout.as_secs().max(1).to_string());
        self.client
            .json(
                self.client.get(url).timeout(timeout + self.request_timeout),
                timeout,
            )
            .await
    }

    async fn click_button(
        &mut self,
        node: &ResponseNode,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<ResponseNode, CourierError> {
        let url = self.client.url(&["conversations", &self.id, "click"])?;
        let request = ClickRequest {
            message_id: node.id,
            payload,
            timeout_secs: timeout.as_secs().max(1),
        };
        self.client
            .json(
                self.client
                    .post(url)
                    .json(&request)
                    .timeout(timeout + self.request_timeout),
                timeout,
            )
            .await
    }

    async fn close(&mut self) -> Result<(), CourierError> {
        if self.closed {
            return Ok(());
        }
        let url = self.client.url(&["conversations", &self.id])?;
        self.client.empty(self.client.delete(url)).await?;
        self.closed = true;
        Ok(())
    }
}
