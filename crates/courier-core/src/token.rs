// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access token codec.
//!
//! A [`Locator`] is serialized as `get-<index*m>` or `get-<start*m>-<end*m>`
//! and then URL-safe base64 encoded with the padding stripped. `m` is the
//! absolute value of the operator storage channel id. Encoder and decoder
//! must agree on `m` or every previously issued token becomes unrecoverable.
//!
//! The scrambling is not a security boundary; it only keeps raw message
//! indices out of the URL.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const PREFIX: &str = "get-";

/// Errors produced while building a codec or decoding a token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("storage channel id must be non-zero")]
    ZeroMultiplier,

    #[error("token is empty")]
    Empty,

    #[error("token is not valid url-safe base64: {0}")]
    InvalidBase64(String),

    #[error("decoded token is not valid UTF-8")]
    NotUtf8,

    #[error("decoded token does not start with `get-`")]
    MissingPrefix,

    #[error("decoded token body `{0}` is not one or two numeric segments")]
    MalformedBody(String),

    #[error("segment `{0}` is not a multiple of the storage multiplier")]
    NotAMultiple(String),

    #[error("segment `{0}` is out of range for a message index")]
    OutOfRange(String),

    #[error("range start {start} is after range end {end}")]
    ReversedRange { start: u64, end: u64 },
}

/// Position of relocated content inside the operator storage channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// One stored message.
    Single { index: u64 },
    /// An inclusive run of stored messages.
    Range { start: u64, end: u64 },
}

impl Locator {
    pub fn single(index: u64) -> Self {
        Locator::Single { index }
    }

    /// Builds a range locator, rejecting `start > end`.
    pub fn range(start: u64, end: u64) -> Result<Self, TokenError> {
        if start > end {
            return Err(TokenError::ReversedRange { start, end });
        }
        Ok(Locator::Range { start, end })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Single { index } => write!(f, "#{index}"),
            Locator::Range { start, end } => write!(f, "#{start}..=#{end}"),
        }
    }
}

/// Reversible encoder/decoder between [`Locator`]s and opaque tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCodec {
    multiplier: u64,
}

impl TokenCodec {
    /// Creates a codec for the given storage channel id (sign is ignored).
    pub fn new(storage_channel_id: i64) -> Result<Self, TokenError> {
        let multiplier = storage_channel_id.unsigned_abs();
        if multiplier == 0 {
            return Err(TokenError::ZeroMultiplier);
        }
        Ok(Self { multiplier })
    }

    pub fn multiplier(&self) -> u64 {
        self.multiplier
    }

    /// Encodes a locator into an unpadded URL-safe base64 token.
    pub fn encode(&self, locator: &Locator) -> String {
        let m = u128::from(self.multiplier);
        let plain = match *locator {
            Locator::Single { index } => format!("{PREFIX}{}", u128::from(index) * m),
            Locator::Range { start, end } => format!(
                "{PREFIX}{}-{}",
                u128::from(start) * m,
                u128::from(end) * m
            ),
        };
        URL_SAFE_NO_PAD.encode(plain.as_bytes())
    }

    /// Decodes a token produced by [`TokenCodec::encode`].
    pub fn decode(&self, token: &str) -> Result<Locator, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Empty);
        }

        let mut padded = token.to_string();
        let missing = (4 - padded.len() % 4) % 4;
        padded.extend(std::iter::repeat_n('=', missing));

        let bytes = URL_SAFE
            .decode(padded.as_bytes())
            .map_err(|e| TokenError::InvalidBase64(e.to_string()))?;
        let plain = String::from_utf8(bytes).map_err(|_| TokenError::NotUtf8)?;
        let body = plain.strip_prefix(PREFIX).ok_or(TokenError::MissingPrefix)?;

        let segments: Vec<&str> = body.split('-').collect();
        match segments.as_slice() {
            [index] => Ok(Locator::single(self.unscramble(index)?)),
            [start, end] => {
                let start = self.unscramble(start)?;
                let end = self.unscramble(end)?;
                Locator::range(start, end)
            }
            _ => Err(TokenError::MalformedBody(body.to_string())),
        }
    }

    fn unscramble(&self, segment: &str) -> Result<u64, TokenError> {
        if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenError::MalformedBody(segment.to_string()));
        }
        let value: u128 = segment
            .parse()
            .map_err(|_| TokenError::OutOfRange(segment.to_string()))?;
        let m = u128::from(self.multiplier);
        if value % m != 0 {
            return Err(TokenError::NotAMultiple(segment.to_string()));
        }
        u64::try_from(value / m).map_err(|_| TokenError::OutOfRange(segment.to_string()))
    }
}

/// Formats tokens as the externally visible redemption URL.
///
/// `https://<host>/<handle>?start=<token>`; this shape is consumed by the
/// redemption subsystem and must stay stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLinkFormat {
    host: String,
    handle: String,
}

impl AccessLinkFormat {
    pub fn new(host: &str, handle: &str) -> Self {
        Self {
            host: host.trim().trim_end_matches('/').to_string(),
            handle: handle.trim().trim_start_matches('@').to_string(),
        }
    }

    pub fn link(&self, token: &str) -> String {
        format!("https://{}/{}?start={token}", self.host, self.handle)
    }

    /// Accepts either a bare token or a full access link and returns the token.
    pub fn token_from(input: &str) -> &str {
        let input = input.trim();
        match input.rfind("start=") {
            Some(pos) => {
                let rest = &input[pos + "start=".len()..];
                rest.split(['&', '#']).next().unwrap_or(rest)
            }
            None => input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const STORAGE_CHANNEL: i64 = -1002818242381;

    fn codec() -> TokenCodec {
        TokenCodec::new(STORAGE_CHANNEL).unwrap()
    }

    fn raw(plain: &str) -> String {
        URL_SAFE_NO_PAD.encode(plain.as_bytes())
    }

    #[test]
    fn single_token_matches_known_layout() {
        let token = codec().encode(&Locator::single(7));
        let expected = raw(&format!("get-{}", 7u128 * 1002818242381));
        assert_eq!(token, expected);
        assert!(!token.contains('='));
    }

    #[test]
    fn range_token_has_two_segments() {
        let locator = Locator::range(10, 12).unwrap();
        let token = codec().encode(&locator);
        let expected = raw(&format!(
            "get-{}-{}",
            10u128 * 1002818242381,
            12u128 * 1002818242381
        ));
        assert_eq!(token, expected);
        assert_eq!(codec().decode(&token).unwrap(), locator);
    }

    #[test]
    fn sign_of_channel_id_is_ignored() {
        let a = TokenCodec::new(-42).unwrap();
        let b = TokenCodec::new(42).unwrap();
        assert_eq!(a.encode(&Locator::single(5)), b.encode(&Locator::single(5)));
    }

    #[test]
    fn zero_channel_is_rejected() {
        assert_eq!(TokenCodec::new(0), Err(TokenError::ZeroMultiplier));
    }

    #[test]
    fn large_indices_do_not_overflow() {
        let locator = Locator::single(u64::from(u32::MAX));
        let token = codec().encode(&locator);
        assert_eq!(codec().decode(&token).unwrap(), locator);
    }

    #[test]
    fn malformed_tokens_are_explicit_errors() {
        let c = codec();
        assert_eq!(c.decode(""), Err(TokenError::Empty));
        assert!(matches!(c.decode("a"), Err(TokenError::InvalidBase64(_))));
        assert!(matches!(c.decode("!!!!"), Err(TokenError::InvalidBase64(_))));
        assert_eq!(c.decode(&raw("put-1")), Err(TokenError::MissingPrefix));
        assert!(matches!(
            c.decode(&raw("get-abc")),
            Err(TokenError::MalformedBody(_))
        ));
        assert!(matches!(
            c.decode(&raw("get-+1002818242381")),
            Err(TokenError::MalformedBody(_))
        ));
        assert!(matches!(
            c.decode(&raw("get-1-2-3")),
            Err(TokenError::MalformedBody(_))
        ));
        assert!(matches!(
            c.decode(&raw("get-")),
            Err(TokenError::MalformedBody(_))
        ));
    }

    #[test]
    fn wrong_multiplier_is_detected() {
        let token = TokenCodec::new(-1001).unwrap().encode(&Locator::single(3));
        assert!(matches!(
            codec().decode(&token),
            Err(TokenError::NotAMultiple(_))
        ));
    }

    #[test]
    fn reversed_range_is_rejected() {
        let m = 1002818242381u128;
        let token = raw(&format!("get-{}-{}", 9 * m, 4 * m));
        assert_eq!(
            codec().decode(&token),
            Err(TokenError::ReversedRange { start: 9, end: 4 })
        );
    }

    #[test]
    fn decode_tolerates_surrounding_whitespace() {
        let token = codec().encode(&Locator::single(99));
        assert_eq!(
            codec().decode(&format!("  {token}\n")).unwrap(),
            Locator::single(99)
        );
    }

    #[test]
    fn access_link_shape_is_stable() {
        let format = AccessLinkFormat::new("t.me", "@vault_bot");
        assert_eq!(format.link("Z2V0LTE"), "https://t.me/vault_bot?start=Z2V0LTE");
    }

    #[test]
    fn token_from_accepts_links_and_bare_tokens() {
        assert_eq!(
            AccessLinkFormat::token_from("https://t.me/vault_bot?start=abc&x=1"),
            "abc"
        );
        assert_eq!(AccessLinkFormat::token_from(" abc "), "abc");
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(
            channel in prop_oneof![1i64..=i64::MAX, i64::MIN + 1..=-1i64],
            a in any::<u32>(),
            b in any::<u32>(),
            ranged in any::<bool>(),
        ) {
            let codec = TokenCodec::new(channel).unwrap();
            let (lo, hi) = (u64::from(a.min(b)), u64::from(a.max(b)));
            let locator = if ranged {
                Locator::range(lo, hi).unwrap()
            } else {
                Locator::single(lo)
            };
            prop_assert_eq!(codec.decode(&codec.encode(&locator)), Ok(locator));
        }
    }
}
