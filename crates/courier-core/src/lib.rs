// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courier acquisition engine.
//!
//! Error taxonomy, shared data model, the access token codec, and the adapter
//! traits the engine is written against.

pub mod error;
pub mod token;
pub mod traits;
pub mod types;

pub use error::{CourierError, ErrorClass};
pub use token::{AccessLinkFormat, Locator, TokenCodec, TokenError};
pub use types::{
    AdapterType, Button, ButtonKind, DownloadedMedia, HealthStatus, LinkRecord, MediaAsset,
    MediaFingerprint, MediaMetadata, RelocatedAsset, ResponseNode, SourceLink, UploadRequest,
};

pub use traits::{Conversation, MessagingPlatform, PluginAdapter, StorageAdapter};
