// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the engine, adapters and storage.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Platform,
    Storage,
}

/// A reference to a vending bot plus the command payload to send it.
///
/// Immutable once built. The raw text doubles as the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLink {
    raw: String,
    bot: String,
    command: String,
}

impl SourceLink {
    /// Builds a link for `bot`, deriving the command from `raw`.
    ///
    /// A `start=` parameter becomes `/start <param>`; anything else is sent
    /// verbatim.
    pub fn new(raw: impl Into<String>, bot: impl Into<String>) -> Self {
        let raw = raw.into().trim().to_string();
        let bot = bot.into().trim().trim_start_matches('@').to_string();
        let command = derive_command(&raw);
        Self { raw, bot, command }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn bot(&self) -> &str {
        &self.bot
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl fmt::Display for SourceLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn derive_command(raw: &str) -> String {
    match raw.rfind("start=") {
        Some(pos) => {
            let rest = &raw[pos + "start=".len()..];
            let param = rest.split(['&', '#']).next().unwrap_or_default();
            if param.is_empty() {
                "/start".to_string()
            } else {
                format!("/start {param}")
            }
        }
        None => raw.to_string(),
    }
}

/// What happens when a button is pressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ButtonKind {
    /// Opens a URL (channel, another bot, or anything else).
    Url { url: String },
    /// Sends an opaque callback payload back to the bot.
    Payload { data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    #[serde(flatten)]
    pub kind: ButtonKind,
}

impl Button {
    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: ButtonKind::Url { url: url.into() },
        }
    }

    pub fn payload(label: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            label: label.into(),
            kind: ButtonKind::Payload { data: data.into() },
        }
    }
}

/// One message received from a vending bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseNode {
    pub id: i64,
    #[serde(default)]
    pub text: String,
    /// Rows of buttons, scanned left-to-right, top-to-bottom.
    #[serde(default)]
    pub buttons: Vec<Vec<Button>>,
    #[serde(default)]
    pub media: Option<MediaAsset>,
    /// Sent by the operator account rather than the bot.
    #[serde(default)]
    pub outgoing: bool,
}

impl ResponseNode {
    pub fn text(id: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            buttons: Vec::new(),
            media: None,
            outgoing: false,
        }
    }

    pub fn with_buttons(mut self, buttons: Vec<Vec<Button>>) -> Self {
        self.buttons = buttons;
        self
    }

    pub fn with_media(mut self, media: MediaAsset) -> Self {
        self.media = Some(media);
        self
    }

    /// Buttons in scan order.
    pub fn buttons_in_order(&self) -> impl Iterator<Item = &Button> {
        self.buttons.iter().flatten()
    }

    /// True when `other` is the same message with different visible content.
    pub fn differs_from(&self, other: &ResponseNode) -> bool {
        self.id == other.id
            && (self.text != other.text
                || self.buttons != other.buttons
                || self.media != other.media)
    }
}

/// Platform-native identity of a media object, used as the dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaFingerprint {
    pub media_id: i64,
    pub access_hash: i64,
    pub dc_id: i32,
}

impl fmt::Display for MediaFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.media_id, self.access_hash, self.dc_id)
    }
}

/// Playback attributes carried over on re-upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub duration_secs: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(default)]
    pub supports_streaming: bool,
}

/// A remote video discovered in a bot response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub fingerprint: MediaFingerprint,
    #[serde(default)]
    pub metadata: MediaMetadata,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Everything the platform needs to publish a fresh upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub metadata: MediaMetadata,
    pub caption: Option<String>,
    pub file_name: Option<String>,
}

impl From<&MediaAsset> for UploadRequest {
    fn from(asset: &MediaAsset) -> Self {
        Self {
            metadata: asset.metadata.clone(),
            caption: asset.caption.clone(),
            file_name: asset.file_name.clone(),
        }
    }
}

/// A media copy living in the operator storage channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocatedAsset {
    pub storage_channel: i64,
    pub message_index: u64,
    pub fingerprint: MediaFingerprint,
    pub metadata: MediaMetadata,
    pub caption: Option<String>,
}

/// Persisted outcome of a completed link, in the externally consumed shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    pub original_link: String,
    pub access_tokens: Vec<String>,
    pub media_fingerprints: Vec<MediaFingerprint>,
    /// RFC 3339 timestamp.
    pub resolved_at: String,
}

/// Local file produced by a media download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedMedia {
    pub path: PathBuf,
    pub bytes: u64,
}
