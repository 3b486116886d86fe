// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier serve` command implementation.
//!
//! Reads links from stdin, one per line, and resolves each in its own task.
//! A semaphore sized by `engine.max_concurrent_links` bounds how many run at
//! once. Every finished link is written to stdout as one JSON line.
//!
//! SIGINT/SIGTERM stops intake; links already running are allowed to finish.
//! A credential failure triggers the same shutdown and is returned as the
//! command's error.

use std::sync::Arc;

use courier_config::CourierConfig;
use courier_core::{CourierError, SourceLink};
use courier_engine::{Engine, Resolution};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::runtime;

/// Counts reported when `serve` returns.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ServeSummary {
    pub finished: usize,
    pub tokens: usize,
    pub rejected: usize,
}

pub async fn run_serve(config: &CourierConfig) -> Result<(), CourierError> {
    let engine = Arc::new(runtime::build_engine(config).await?);
    let cancel = install_signal_handler();

    info!("reading links from stdin");
    let summary = serve_lines(
        engine,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        cancel,
    )
    .await?;

    info!(
        finished = summary.finished,
        tokens = summary.tokens,
        rejected = summary.rejected,
        "courier serve shutdown complete"
    );
    Ok(())
}

type LinkResult = (SourceLink, Result<Resolution, CourierError>);

/// Drive the serve loop over any line source and sink.
pub async fn serve_lines<R, W>(
    engine: Arc<Engine>,
    reader: R,
    mut out: W,
    cancel: CancellationToken,
) -> Result<ServeSummary, CourierError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let semaphore = Arc::new(Semaphore::new(engine.settings().max_concurrent_links));
    let mut tasks: JoinSet<LinkResult> = JoinSet::new();
    let mut lines = reader.lines();
    let mut summary = ServeSummary::default();
    let mut fatal: Option<CourierError> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(pending = tasks.len(), "shutdown requested, no longer reading links");
                break;
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                finish(joined, &mut out, &mut summary, &mut fatal, &cancel).await?;
            }
            line = lines.next_line() => {
                let raw = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        debug!("input closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read input");
                        break;
                    }
                };
                let raw = raw.trim();
                if raw.is_empty() || raw.starts_with('#') {
                    continue;
                }
                let link = match engine.parse_link(raw) {
                    Ok(link) => link,
                    Err(e) => {
                        warn!(link = raw, error = %e, "rejected input line");
                        summary.rejected += 1;
                        let line = serde_json::json!({ "link": raw, "outcome": "rejected" });
                        write_line(&mut out, &line).await?;
                        continue;
                    }
                };

                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = Arc::clone(&semaphore).acquire_owned() => Some(permit.map_err(|e| {
                        CourierError::Internal(format!("link semaphore closed: {e}"))
                    })?),
                };
                let Some(permit) = permit else {
                    break;
                };
                let engine = Arc::clone(&engine);
                tasks.spawn(async move {
                    let _permit = permit;
                    let result = engine.resolve(&link).await;
                    (link, result)
                });
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        finish(joined, &mut out, &mut summary, &mut fatal, &cancel).await?;
    }
    out.flush().await.map_err(io_error)?;

    match fatal {
        Some(e) => Err(e),
        None => Ok(summary),
    }
}

async fn finish<W: AsyncWrite + Unpin>(
    joined: Result<LinkResult, JoinError>,
    out: &mut W,
    summary: &mut ServeSummary,
    fatal: &mut Option<CourierError>,
    cancel: &CancellationToken,
) -> Result<(), CourierError> {
    let (link, result) = match joined {
        Ok(done) => done,
        Err(e) => {
            error!(error = %e, "link task panicked");
            return Ok(());
        }
    };
    match result {
        Ok(resolution) => {
            summary.finished += 1;
            summary.tokens += resolution.tokens().len();
            let line = serde_json::json!({
                "link": link.raw(),
                "outcome": resolution.label(),
                "accessTokens": resolution.tokens(),
            });
            write_line(out, &line).await
        }
        Err(e) => {
            error!(link = %link, error = %e, "fatal error, shutting down");
            cancel.cancel();
            fatal.get_or_insert(e);
            Ok(())
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(
    out: &mut W,
    value: &serde_json::Value,
) -> Result<(), CourierError> {
    let mut line = value.to_string();
    line.push('\n');
    out.write_all(line.as_bytes()).await.map_err(io_error)?;
    out.flush().await.map_err(io_error)
}

fn io_error(e: std::io::Error) -> CourierError {
    CourierError::Internal(format!("failed to write output: {e}"))
}

/// Installs handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is received.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("received SIGINT (Ctrl+C), initiating shutdown"),
                        _ = sigterm.recv() => info!("received SIGTERM, initiating shutdown"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler, only Ctrl+C will stop serve");
                    let _ = ctrl_c.await;
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        trigger.cancel();
    });

    token
}
