// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier token` command implementation.

use courier_config::CourierConfig;
use courier_core::{AccessLinkFormat, CourierError, Locator, TokenCodec};

fn codec(config: &CourierConfig) -> Result<TokenCodec, CourierError> {
    let channel = config.token.storage_channel_id.ok_or_else(|| {
        CourierError::Config("token.storage_channel_id must be set to encode or decode".into())
    })?;
    Ok(TokenCodec::new(channel)?)
}

/// Token for `index`, or for `index..=end`. The access link is printed too
/// when a vending handle is configured.
pub fn encode(config: &CourierConfig, index: u64, end: Option<u64>) -> Result<String, CourierError> {
    let locator = match end {
        Some(end) => Locator::range(index, end)?,
        None => Locator::single(index),
    };
    let token = codec(config)?.encode(&locator);

    match config.token.vending_handle.as_deref() {
        Some(handle) => {
            let links = AccessLinkFormat::new(&config.links.platform_host, handle);
            Ok(format!("{token}\n{}", links.link(&token)))
        }
        None => Ok(token),
    }
}

pub fn decode(config: &CourierConfig, input: &str) -> Result<String, CourierError> {
    let locator = codec(config)?.decode(AccessLinkFormat::token_from(input))?;
    Ok(match locator {
        Locator::Single { index } => format!("single {index}"),
        Locator::Range { start, end } => format!("range {start}..={end}"),
    })
}
