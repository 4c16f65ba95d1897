//! Partial fetcher: ranged GETs and HEAD existence checks through the
//! authenticated session.
//!
//! Auth rejections (401/403) are surfaced as their own error kind because the
//! callers handle them through the storm protocol; every other failure is a
//! terminal transport error for that attempt.

use log::debug;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, RANGE};
use reqwest::StatusCode;
use thiserror::Error;

use crate::auth::Session;

/// Typed failure of a single fetch attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    /// 401/403: credentials rejected, recoverable via refresh.
    #[error("auth_rejected: status {0}")]
    Auth(u16),

    /// Any other non-2xx HTTP status. Not retried.
    #[error("http_error: status {0}")]
    Status(u16),

    /// Network-level failure (connect, read, TLS, ...). Not retried.
    #[error("http_error: {0}")]
    Transport(String),
}

/// Downloads the byte range `[0, budget_bytes)` of `url`.
///
/// Returns the body on any 2xx response (servers that ignore the Range header
/// and return 200 with the full body are fine; we still only asked for the
/// prefix we need and a longer body only improves the inspection).
pub async fn fetch_range(
    session: &Session,
    url: &str,
    budget_bytes: u64,
) -> Result<Vec<u8>, FetchError> {
    let range = format!("bytes=0-{}", budget_bytes.saturating_sub(1));
    let response = session
        .get(url)
        .header(RANGE, range)
        .send()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(FetchError::Auth(status.as_u16()));
    }
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;
    debug!("fetched {} bytes from {}", body.len(), url);
    Ok(body.to_vec())
}

/// What a HEAD existence check observed. Statuses are passed through; the
/// probe sweeper owns the classification policy.
#[derive(Debug, Clone)]
pub struct HeadSnapshot {
    /// HTTP status code
    pub status: u16,
    /// URL after redirects
    pub final_url: String,
    /// Lowercased Content-Type header, empty if absent
    pub content_type: String,
    /// Content-Length header, if present
    pub content_length: Option<u64>,
}

/// Issues a HEAD request and snapshots the response line and headers.
///
/// Only wire-level failures are errors; every completed HTTP exchange,
/// whatever its status, yields a snapshot.
pub async fn head(session: &Session, url: &str) -> Result<HeadSnapshot, FetchError> {
    let response = session
        .head(url)
        .send()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    // `Response::content_length()` reports the body size hint, which is 0
    // for HEAD responses; read the header itself instead.
    let content_length = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());

    Ok(HeadSnapshot {
        status: response.status().as_u16(),
        final_url: response.url().to_string(),
        content_type,
        content_length,
    })
}
