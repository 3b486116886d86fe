// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier acquisition engine.
//!
//! Platform failure signals are modelled as variants of [`CourierError`] so
//! that every adapter speaks the same taxonomy. [`CourierError::class`] folds
//! them into the handful of categories the engine actually branches on.

use std::time::Duration;

use thiserror::Error;

use crate::token::TokenError;

/// The primary error type used across all Courier crates.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The operator account credentials are invalid or revoked.
    #[error("platform rejected operator credentials: {0}")]
    Unauthorized(String),

    /// The platform asked us to back off for the given duration.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// A bounded wait on the platform expired.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Banned from the target, forbidden to write, or the peer is unusable.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The operator account is already a member of the channel.
    #[error("already a member of the channel")]
    AlreadyMember,

    /// The invite hash does not exist.
    #[error("invite link is invalid: {0}")]
    InviteInvalid(String),

    /// The invite hash existed but has expired or was revoked.
    #[error("invite link has expired: {0}")]
    InviteExpired(String),

    /// The channel is private and cannot be reached with what we have.
    #[error("channel is private: {0}")]
    ChannelPrivate(String),

    /// A reference string could not be interpreted as a vending bot link.
    #[error("invalid source link `{0}`")]
    InvalidLink(String),

    /// Access token encoding or decoding failed.
    #[error("access token error: {0}")]
    Token(#[from] TokenError),

    /// Media download, local file handling, or upload failed.
    #[error("media error: {message}")]
    Media {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Any other platform failure (transport errors, unexpected payloads).
    #[error("platform error: {message}")]
    Platform {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse category of a [`CourierError`], used for control-flow decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Stop the whole engine; never retried.
    Fatal,
    /// Retry the operation after a delay.
    Retryable,
    /// Abort this link's run without retrying.
    AccessDenied,
    /// A gate that can never be satisfied; skip it and continue.
    PermanentGate,
    /// Logged and treated as a plain failure of the current step.
    Other,
}

impl CourierError {
    /// Classify this error for the engine's branching.
    pub fn class(&self) -> ErrorClass {
        match self {
            CourierError::Unauthorized(_) => ErrorClass::Fatal,
            CourierError::RateLimited { .. } | CourierError::Timeout { .. } => {
                ErrorClass::Retryable
            }
            CourierError::AccessDenied(_) => ErrorClass::AccessDenied,
            CourierError::InviteInvalid(_)
            | CourierError::InviteExpired(_)
            | CourierError::ChannelPrivate(_) => ErrorClass::PermanentGate,
            _ => ErrorClass::Other,
        }
    }

    /// Returns `true` if this error must stop the engine.
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }

    /// The platform-signalled wait, if this is a rate-limit error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CourierError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Shorthand for a [`CourierError::Platform`] without a source.
    pub fn platform(message: impl Into<String>) -> Self {
        CourierError::Platform {
            message: message.into(),
            source: None,
        }
    }
}
