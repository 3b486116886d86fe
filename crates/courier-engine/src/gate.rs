// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel gate joiner.
//!
//! Turns a [`ChannelReference`] into a membership action. Public channels are
//! checked before joining so an existing membership costs no mutation;
//! private invites are redeemed directly. Every join or redeem attempt is
//! followed by the configured mutation delay.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use courier_core::{CourierError, ErrorClass, MessagingPlatform};
use tracing::{debug, info, warn};

/// A channel whose membership a vending bot demands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelReference {
    Public { handle: String },
    Private { invite_hash: String },
}

impl ChannelReference {
    /// True for a public reference naming `handle` (case-insensitive).
    pub fn is_handle(&self, handle: &str) -> bool {
        match self {
            ChannelReference::Public { handle: h } => {
                h.eq_ignore_ascii_case(handle.trim_start_matches('@'))
            }
            ChannelReference::Private { .. } => false,
        }
    }
}

impl fmt::Display for ChannelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelReference::Public { handle } => write!(f, "@{handle}"),
            ChannelReference::Private { invite_hash } => write!(f, "+{invite_hash}"),
        }
    }
}

/// Result of trying to satisfy one gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
    /// Invalid or expired invite, or a private channel: never retried.
    PermanentFailure,
    /// Anything else that went wrong; logged.
    Failed,
}

impl JoinOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, JoinOutcome::Joined | JoinOutcome::AlreadyMember)
    }

    fn label(self) -> &'static str {
        match self {
            JoinOutcome::Joined => "joined",
            JoinOutcome::AlreadyMember => "already_member",
            JoinOutcome::PermanentFailure => "permanent_failure",
            JoinOutcome::Failed => "failed",
        }
    }
}

pub struct GateJoiner {
    platform: Arc<dyn MessagingPlatform>,
    mutation_delay: Duration,
    retry_limit: u32,
}

impl GateJoiner {
    pub fn new(platform: Arc<dyn MessagingPlatform>, mutation_delay: Duration, retry_limit: u32) -> Self {
        Self {
            platform,
            mutation_delay,
            retry_limit,
        }
    }

    /// Satisfy one gate.
    ///
    /// Only credential failures come back as `Err`; everything else is folded
    /// into a [`JoinOutcome`].
    pub async fn join(&self, reference: &ChannelReference) -> Result<JoinOutcome, CourierError> {
        let mut retries = 0;
        let outcome = loop {
            let err = match self.attempt(reference).await {
                Ok(outcome) => break outcome,
                Err(err) => err,
            };

            if matches!(err, CourierError::AlreadyMember) {
                break JoinOutcome::AlreadyMember;
            }
            match err.class() {
                ErrorClass::Fatal => return Err(err),
                ErrorClass::PermanentGate => {
                    info!(gate = %reference, error = %err, "gate can never be satisfied, skipping");
                    break JoinOutcome::PermanentFailure;
                }
                _ => {}
            }
            match err.retry_after() {
                Some(wait) if retries < self.retry_limit => {
                    retries += 1;
                    warn!(gate = %reference, wait_secs = wait.as_secs(), "rate limited while joining, backing off");
                    tokio::time::sleep(wait).await;
                }
                _ => {
                    warn!(gate = %reference, error = %err, "join failed");
                    break JoinOutcome::Failed;
                }
            }
        };

        metrics::counter!("courier_gate_joins_total", "outcome" => outcome.label()).increment(1);
        debug!(gate = %reference, outcome = outcome.label(), "gate resolved");
        Ok(outcome)
    }

    async fn attempt(&self, reference: &ChannelReference) -> Result<JoinOutcome, CourierError> {
        let result = match reference {
            ChannelReference::Public { handle } => {
                if self.platform.query_membership(handle).await? {
                    return Ok(JoinOutcome::AlreadyMember);
                }
                self.platform.join_public_channel(handle).await
            }
            ChannelReference::Private { invite_hash } => {
                self.platform.redeem_invite(invite_hash).await
            }
        };
        self.pace().await;
        result.map(|()| JoinOutcome::Joined)
    }

    async fn pace(&self) {
        if !self.mutation_delay.is_zero() {
            tokio::time::sleep(self.mutation_delay).await;
        }
    }
}
