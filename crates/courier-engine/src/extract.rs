// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recognising vending-bot links, channel links and `@handles` in bot text.

use std::collections::HashSet;

use courier_config::model::LinksConfig;
use courier_core::{CourierError, SourceLink};
use regex::Regex;

use crate::gate::ChannelReference;

/// First path segments on the platform host that never name a channel.
const RESERVED_PATHS: &[&str] = &["c", "s", "iv", "share", "proxy", "socks", "addstickers", "addlist"];

/// What a URL on the platform host points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlTarget {
    /// A channel that has to be joined.
    Gate(ChannelReference),
    /// Another vending bot.
    VendingBot(SourceLink),
    /// Something else (foreign host, post link, malformed).
    Other,
}

/// Compiled recognisers for one platform host.
#[derive(Debug, Clone)]
pub struct LinkPatterns {
    url_in_text: Regex,
    url_parts: Regex,
    handle: Regex,
    stop_words: HashSet<String>,
    gate_keywords: Vec<String>,
}

impl LinkPatterns {
    pub fn new(config: &LinksConfig) -> Result<Self, CourierError> {
        let host = regex::escape(config.platform_host.trim());
        let compile = |pattern: String| {
            Regex::new(&pattern)
                .map_err(|e| CourierError::Config(format!("invalid link pattern: {e}")))
        };

        Ok(Self {
            url_in_text: compile(format!(
                r#"(?i)(?:https?://)?(?:www\.)?{host}/[^\s<>"'()\[\]]+"#
            ))?,
            url_parts: compile(format!(r"(?i)^(?:https?://)?(?:www\.)?{host}/(.+)$"))?,
            handle: compile(r"(?:^|[^A-Za-z0-9_@./])@([A-Za-z0-9_]+)".to_string())?,
            stop_words: config
                .stop_words
                .iter()
                .map(|w| w.trim().to_lowercase())
                .collect(),
            gate_keywords: config
                .gate_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        })
    }

    /// Parse a router-supplied reference into a [`SourceLink`].
    pub fn parse_source_link(&self, raw: &str) -> Result<SourceLink, CourierError> {
        match self.classify_url(raw.trim()) {
            UrlTarget::VendingBot(link) => Ok(link),
            _ => Err(CourierError::InvalidLink(raw.trim().to_string())),
        }
    }

    /// Whether a response talks about joining something.
    pub fn is_gate_prompt(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.gate_keywords.iter().any(|k| text.contains(k.as_str()))
    }

    /// Every channel a gate prompt points at, in order of appearance.
    ///
    /// Explicit links come first, then `@handles`. Stop words, other vending
    /// bots and references to `bot` itself are dropped.
    pub fn channel_references(&self, text: &str, bot: &str) -> Vec<ChannelReference> {
        let mut seen = HashSet::new();
        let mut refs = Vec::new();

        for m in self.url_in_text.find_iter(text) {
            let url = m.as_str().trim_end_matches(['.', ',', '!', '?', ';', ':']);
            if let UrlTarget::Gate(reference) = self.classify_url(url)
                && !reference.is_handle(bot)
                && seen.insert(reference.clone())
            {
                refs.push(reference);
            }
        }

        for caps in self.handle.captures_iter(text) {
            let Some(handle) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            let lower = handle.to_lowercase();
            if self.stop_words.contains(&lower) || lower.ends_with("bot") {
                continue;
            }
            let reference = ChannelReference::Public {
                handle: handle.to_string(),
            };
            if !reference.is_handle(bot) && seen.insert(reference.clone()) {
                refs.push(reference);
            }
        }

        refs
    }

    /// Classify a URL on the platform host.
    pub fn classify_url(&self, url: &str) -> UrlTarget {
        let Some(path) = self
            .url_parts
            .captures(url.trim())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
        else {
            return UrlTarget::Other;
        };
        let path = path.split(['?', '#']).next().unwrap_or_default();

        let invite = path
            .strip_prefix("joinchat/")
            .or_else(|| path.strip_prefix('+'));
        if let Some(rest) = invite {
            let hash = rest.split('/').next().unwrap_or_default();
            if hash.is_empty() {
                return UrlTarget::Other;
            }
            return UrlTarget::Gate(ChannelReference::Private {
                invite_hash: hash.to_string(),
            });
        }

        let handle = path.split('/').next().unwrap_or_default();
        if handle.is_empty()
            || !handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            || RESERVED_PATHS.contains(&handle.to_lowercase().as_str())
        {
            return UrlTarget::Other;
        }

        if handle.to_lowercase().ends_with("bot") {
            UrlTarget::VendingBot(SourceLink::new(url.trim(), handle))
        } else {
            UrlTarget::Gate(ChannelReference::Public {
                handle: handle.to_string(),
            })
        }
    }
}
