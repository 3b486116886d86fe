// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the session bridge.
//!
//! Builds URLs, attaches the bearer token and turns error responses into the
//! [`CourierError`] taxonomy using the RPC error name in the body.

use std::time::Duration;

use courier_config::model::BridgeConfig;
use courier_core::CourierError;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::types::ErrorBody;

/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    client: reqwest::Client,
    base_url: Url,
    request_timeout: Duration,
    transfer_timeout: Duration,
}

impl BridgeClient {
    pub fn new(config: &BridgeConfig) -> Result<Self, CourierError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| CourierError::Config(format!("invalid bridge.base_url: {e}")))?;

        let mut headers = HeaderMap::new();
        if let Some(token) = config.api_token.as_deref() {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| CourierError::Config(format!("invalid bridge.api_token: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()
            .map_err(|e| CourierError::Platform {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url,
            request_timeout,
            transfer_timeout: Duration::from_secs(config.transfer_timeout_secs),
        })
    }

    pub fn transfer_timeout(&self) -> Duration {
        self.transfer_timeout
    }

    /// `base_url` with `segments` appended, each percent-encoded.
    pub fn url(&self, segments: &[&str]) -> Result<Url, CourierError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| CourierError::Config("bridge.base_url cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn get(&self, url: Url) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post(&self, url: Url) -> RequestBuilder {
        self.client.post(url)
    }

    pub fn delete(&self, url: Url) -> RequestBuilder {
        self.client.delete(url)
    }

    /// Send and decode a JSON body. `waited` is reported if the bridge times out.
    pub async fn json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        waited: Duration,
    ) -> Result<T, CourierError> {
        let response = self.send(request, waited).await?;
        response.json::<T>().await.map_err(|e| CourierError::Platform {
            message: format!("failed to parse bridge response: {e}"),
            source: Some(Box::new(e)),
        })
    }

    /// Send and discard the body.
    pub async fn empty(&self, request: RequestBuilder) -> Result<(), CourierError> {
        self.send(request, self.request_timeout).await.map(|_| ())
    }

    /// Like [`BridgeClient::json`], but a 404 means "no such object".
    pub async fn optional_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        waited: Duration,
    ) -> Result<Option<T>, CourierError> {
        let response = self.dispatch(request, waited).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = self.check(response, waited).await?;
        response.json::<T>().await.map(Some).map_err(|e| CourierError::Platform {
            message: format!("failed to parse bridge response: {e}"),
            source: Some(Box::new(e)),
        })
    }

    /// Send and return the successful response; errors are mapped.
    pub async fn send(
        &self,
        request: RequestBuilder,
        waited: Duration,
    ) -> Result<Response, CourierError> {
        let response = self.dispatch(request, waited).await?;
        self.check(response, waited).await
    }

    async fn dispatch(
        &self,
        request: RequestBuilder,
        waited: Duration,
    ) -> Result<Response, CourierError> {
        request.send().await.map_err(|e| {
            if e.is_timeout() {
                CourierError::Timeout { duration: waited }
            } else {
                CourierError::Platform {
                    message: format!("bridge request failed: {e}"),
                    source: Some(Box::new(e)),
                }
            }
        })
    }

    async fn check(&self, response: Response, waited: Duration) -> Result<Response, CourierError> {
        let status = response.status();
        debug!(status = %status, path = %response.url().path(), "bridge response");
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        Err(map_error(status, retry_after, &body, waited))
    }
}

/// Map a failed bridge response onto the error taxonomy.
///
/// The RPC error name wins; the HTTP status is the fallback.
pub fn map_error(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
    waited: Duration,
) -> CourierError {
    let Ok(ErrorBody {
        error,
        seconds,
        message,
    }) = serde_json::from_str::<ErrorBody>(body)
    else {
        return map_status(status, retry_after, body, waited);
    };

    let name = error.to_ascii_uppercase();
    let detail = message.unwrap_or_else(|| name.clone());

    if let Some(wait) = flood_wait(&name, seconds) {
        return CourierError::RateLimited { retry_after: wait };
    }
    match name.as_str() {
        "AUTH_KEY_INVALID" | "AUTH_KEY_UNREGISTERED" | "SESSION_REVOKED" | "SESSION_EXPIRED"
        | "USER_DEACTIVATED" | "USER_DEACTIVATED_BAN" => CourierError::Unauthorized(detail),
        "INVITE_HASH_INVALID" | "INVITE_HASH_EMPTY" => CourierError::InviteInvalid(detail),
        "INVITE_HASH_EXPIRED" => CourierError::InviteExpired(detail),
        "CHANNEL_PRIVATE" | "CHANNEL_INVALID" => CourierError::ChannelPrivate(detail),
        "USER_ALREADY_PARTICIPANT" => CourierError::AlreadyMember,
        "USER_BANNED_IN_CHANNEL" | "CHAT_WRITE_FORBIDDEN" | "PEER_ID_INVALID"
        | "USER_IS_BLOCKED" | "USERNAME_NOT_OCCUPIED" => CourierError::AccessDenied(detail),
        "TIMEOUT" => CourierError::Timeout { duration: waited },
        _ => map_status(status, retry_after, &detail, waited),
    }
}

/// `FLOOD_WAIT`, `FLOOD_WAIT_<n>` and `SLOWMODE_WAIT_<n>` all carry a wait.
fn flood_wait(name: &str, seconds: Option<u64>) -> Option<Duration> {
    let suffix = name
        .strip_prefix("FLOOD_WAIT")
        .or_else(|| name.strip_prefix("SLOWMODE_WAIT"))?;
    let from_name = suffix.trim_start_matches('_').parse::<u64>().ok();
    Some(Duration::from_secs(seconds.or(from_name).unwrap_or(1)))
}

fn map_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    detail: &str,
    waited: Duration,
) -> CourierError {
    match status {
        StatusCode::UNAUTHORIZED => CourierError::Unauthorized(detail.to_string()),
        StatusCode::FORBIDDEN => CourierError::AccessDenied(detail.to_string()),
        StatusCode::TOO_MANY_REQUESTS => CourierError::RateLimited {
            retry_after: retry_after.unwrap_or(Duration::from_secs(1)),
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            CourierError::Timeout { duration: waited }
        }
        _ => CourierError::platform(format!("bridge returned {status}: {detail}")),
    }
}
