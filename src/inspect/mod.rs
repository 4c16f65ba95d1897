//! Media inspector: ffprobe as a black box.
//!
//! Feeds a downloaded byte prefix to `ffprobe` on stdin and parses the JSON
//! report (container format plus per-stream descriptions). Pure and stateless:
//! identical bytes give identical reports. Everything that can go wrong with
//! the tool - missing binary, non-zero exit, malformed output, hang - is an
//! [`InspectError`] for that one attempt, never fatal to the pool.

mod flatten;

use std::process::Stdio;
use std::time::Duration;

use log::debug;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::FFPROBE_TIMEOUT_SECS;

pub use flatten::{flatten_value, report_fields};

/// Stderr is truncated to this many characters when embedded in an error.
const STDERR_TRUNCATE: usize = 200;

/// Parsed ffprobe report: container format block plus stream descriptions.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaReport {
    /// Container-level metadata (`-show_format`)
    #[serde(default)]
    pub format: serde_json::Map<String, serde_json::Value>,
    /// Per-stream metadata (`-show_streams`), each with at least `codec_type`
    #[serde(default)]
    pub streams: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Failure of one ffprobe invocation.
#[derive(Debug, Error)]
pub enum InspectError {
    /// ffprobe could not be spawned (usually: not installed).
    #[error("ffprobe_error: failed to spawn: {0}")]
    Spawn(String),

    /// ffprobe exited non-zero; carries truncated stderr.
    #[error("ffprobe_error: {0}")]
    Tool(String),

    /// ffprobe emitted something that is not the expected JSON document.
    #[error("ffprobe_error: malformed output: {0}")]
    Malformed(String),

    /// ffprobe did not finish within the invocation timeout.
    #[error("ffprobe_error: timed out after {0}s")]
    Timeout(u64),
}

/// Checks that ffprobe is installed and runnable.
pub async fn ffprobe_available() -> bool {
    Command::new("ffprobe")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Runs ffprobe over `bytes` and returns the parsed report.
pub async fn inspect_bytes(bytes: Vec<u8>) -> Result<MediaReport, InspectError> {
    let mut child = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
            "-",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| InspectError::Spawn(e.to_string()))?;

    // Feed stdin from a separate task: ffprobe often decides after a few KB
    // and exits without draining its input, which shows up here as a broken
    // pipe. That is fine; the report on stdout is what matters.
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| InspectError::Spawn("stdin not captured".to_string()))?;
    let byte_count = bytes.len();
    let writer = tokio::spawn(async move {
        let _ = stdin.write_all(&bytes).await;
        let _ = stdin.shutdown().await;
    });

    let output = tokio::time::timeout(
        Duration::from_secs(FFPROBE_TIMEOUT_SECS),
        child.wait_with_output(),
    )
    .await
    .map_err(|_| InspectError::Timeout(FFPROBE_TIMEOUT_SECS))?
    .map_err(|e| InspectError::Tool(e.to_string()))?;
    writer.abort();

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let truncated: String = stderr.chars().take(STDERR_TRUNCATE).collect();
        return Err(InspectError::Tool(truncated));
    }

    let report: MediaReport = serde_json::from_slice(&output.stdout)
        .map_err(|e| InspectError::Malformed(e.to_string()))?;
    debug!(
        "ffprobe saw {} stream(s) in {} input bytes",
        report.streams.len(),
        byte_count
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_parses_with_missing_sections() {
        let report: MediaReport = serde_json::from_str("{}").expect("empty report should parse");
        assert!(report.format.is_empty());
        assert!(report.streams.is_empty());
    }

    #[test]
    fn report_parses_streams_and_format() {
        let raw = r#"{
            "format": { "format_name": "mp3", "size": "1048576" },
            "streams": [ { "codec_type": "audio", "codec_name": "mp3" } ]
        }"#;
        let report: MediaReport = serde_json::from_str(raw).expect("report should parse");
        assert_eq!(report.streams.len(), 1);
        assert_eq!(
            report.format.get("format_name").and_then(|v| v.as_str()),
            Some("mp3")
        );
    }

    #[test]
    fn error_strings_match_recorded_taxonomy() {
        assert_eq!(
            InspectError::Tool("invalid data".into()).to_string(),
            "ffprobe_error: invalid data"
        );
        assert_eq!(
            InspectError::Timeout(60).to_string(),
            "ffprobe_error: timed out after 60s"
        );
    }
}
