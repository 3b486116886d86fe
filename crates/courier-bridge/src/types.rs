// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the session bridge's JSON API.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct OpenConversationRequest<'a> {
    pub bot: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct OpenConversationResponse {
    pub conversation_id: String,
}

#[derive(Debug, Serialize)]
pub struct SendCommandRequest<'a> {
    pub text: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
}

#[derive(Debug, Serialize)]
pub struct ClickRequest<'a> {
    pub message_id: i64,
    pub payload: &'a [u8],
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct JoinRequest<'a> {
    pub handle: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RedeemRequest<'a> {
    pub invite_hash: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct Membership {
    pub member: bool,
}

#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub message_index: u64,
}

/// Error body returned with any non-2xx status.
///
/// `error` carries the platform's RPC error name, e.g. `FLOOD_WAIT` or
/// `INVITE_HASH_EXPIRED`.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub seconds: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}
