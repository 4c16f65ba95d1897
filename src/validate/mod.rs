//! Escalating validator.
//!
//! Downloads a byte prefix of each candidate URL through the authenticated
//! session and asks ffprobe whether it contains media streams. In ladder mode
//! the probe size escalates (5 -> 100 -> 200 -> 500 MB) when a smaller prefix
//! decodes to zero streams - containers with the index at the tail (mp4 moov
//! atoms, some mkv) need more bytes before any stream is visible. Every other
//! failure is terminal immediately: more bytes do not fix a transport error,
//! an empty body, or a crashed inspector.
//!
//! Auth rejections never surface as outcomes. The per-level attempt loop
//! retries them with jittered backoff and hands bursts to the storm protocol
//! in [`crate::auth`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use rand::Rng;
use thiserror::Error;

use crate::auth::{AuthState, CredentialProvider, Session};
use crate::config::{
    AUTH_RETRY_SLEEP_RANGE_SECS, BYTES_PER_MB, DEEP_SCAN_MB, FAST_SCAN_MB, MANDINGO_SCAN_MB,
    NO_MEDIA_YET, PDF_OR_NOT_FOUND, SUPERDEEP_SCAN_MB, VALIDATE_SLEEP_RANGE_SECS, ScanMode,
};
use crate::fetch::{self, FetchError};
use crate::inspect::{self, InspectError};

/// The canonical scan ladder: monotonically increasing byte budgets.
pub const SCAN_LADDER: [(u64, &str); 4] = [
    (FAST_SCAN_MB, "fast"),
    (DEEP_SCAN_MB, "deep"),
    (SUPERDEEP_SCAN_MB, "superdeep"),
    (MANDINGO_SCAN_MB, "mandingo deep"),
];

/// Terminal failure of a validation, recorded verbatim in the output record.
#[derive(Debug, Error)]
pub enum ValidateError {
    /// URL still carries an unresolved placeholder; never fetched.
    #[error("skipped_unsolved")]
    SkippedUnsolved,

    /// Custom mode selected without a byte budget.
    #[error("custom_size_mb_required")]
    CustomSizeRequired,

    /// The server returned a 2xx with no body.
    #[error("empty_response_body")]
    EmptyBody,

    /// ffprobe parsed the prefix but found zero media streams. The only error
    /// that justifies escalating to a larger budget.
    #[error("no_media_streams")]
    NoStreams,

    /// Transport-level or non-2xx HTTP failure.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// ffprobe failed (non-zero exit, malformed output, timeout).
    #[error(transparent)]
    Inspector(#[from] InspectError),

    /// The storm recovery itself could not proceed.
    #[error("auth_refresh_failed: {0}")]
    AuthRefresh(String),

    /// Every ladder level failed; carries the last level's error.
    #[error("all_scan_levels_failed: {0}")]
    AllLevelsFailed(String),
}

/// Successful validation: how it was proven plus the flattened metadata.
#[derive(Debug, Clone)]
pub struct ValidOutcome {
    /// e.g. `5MB_scan`, `500MB_scan`
    pub validation_method: String,
    /// Flattened format/stream metadata, including `file_size_bytes`
    pub fields: BTreeMap<String, String>,
}

/// Outcome of one validation.
pub type ValidateResult = Result<ValidOutcome, ValidateError>;

/// Validates URLs against the configured scan policy. Shared by all pool
/// workers; holds only shared-ownership state.
pub struct Validator {
    session: Arc<Session>,
    auth: Arc<AuthState>,
    provider: Arc<dyn CredentialProvider>,
    random_sleep: bool,
}

impl Validator {
    /// Creates a validator over a live session.
    pub fn new(
        session: Arc<Session>,
        auth: Arc<AuthState>,
        provider: Arc<dyn CredentialProvider>,
        random_sleep: bool,
    ) -> Self {
        Self {
            session,
            auth,
            provider,
            random_sleep,
        }
    }

    /// Validates one URL under the given scan mode.
    ///
    /// URLs still tagged with an unresolved placeholder are rejected without
    /// any network traffic. Single-level modes perform exactly one scan and
    /// return its result verbatim; `two-pass` walks the ladder.
    pub async fn validate_url(
        &self,
        url: &str,
        mode: ScanMode,
        custom_size_mb: Option<u64>,
    ) -> ValidateResult {
        if url.contains(NO_MEDIA_YET) || url.contains(PDF_OR_NOT_FOUND) {
            return Err(ValidateError::SkippedUnsolved);
        }

        match mode {
            ScanMode::Custom => {
                let size_mb = custom_size_mb.ok_or(ValidateError::CustomSizeRequired)?;
                self.scan_once(url, size_mb).await
            }
            ScanMode::TwoPass => {
                escalate(&SCAN_LADDER, url, |size_mb| self.scan_once(url, size_mb)).await
            }
            single_level => {
                // budget_mb is Some for every remaining mode
                let size_mb = single_level
                    .budget_mb()
                    .ok_or(ValidateError::CustomSizeRequired)?;
                self.scan_once(url, size_mb).await
            }
        }
    }

    /// One fetch+inspect attempt at a fixed budget, retried internally until
    /// a terminal outcome: auth rejections back off and retry (through storm
    /// recovery at the threshold), everything else resolves the attempt.
    async fn scan_once(&self, url: &str, size_mb: u64) -> ValidateResult {
        loop {
            if self.random_sleep {
                jitter_sleep(VALIDATE_SLEEP_RANGE_SECS).await;
            }

            match fetch::fetch_range(&self.session, url, size_mb * BYTES_PER_MB).await {
                Err(FetchError::Auth(status)) => {
                    let burst = self.auth.record_failure();
                    debug!(
                        "auth failure {status} ({burst}/{}) on {url}",
                        self.auth.threshold()
                    );
                    if self.auth.at_threshold() {
                        self.auth
                            .recover(&self.session, self.provider.as_ref())
                            .await
                            .map_err(|e| ValidateError::AuthRefresh(e.to_string()))?;
                    } else {
                        jitter_sleep(AUTH_RETRY_SLEEP_RANGE_SECS).await;
                    }
                    continue;
                }
                Err(other) => return Err(other.into()),
                Ok(body) => {
                    self.auth.reset();
                    if body.is_empty() {
                        return Err(ValidateError::EmptyBody);
                    }

                    let report = inspect::inspect_bytes(body).await?;
                    if report.streams.is_empty() {
                        return Err(ValidateError::NoStreams);
                    }

                    return Ok(ValidOutcome {
                        validation_method: format!("{size_mb}MB_scan"),
                        fields: inspect::report_fields(&report),
                    });
                }
            }
        }
    }
}

/// Walks the scan ladder, escalating only on `no_media_streams`.
///
/// Generic over the attempt so the policy is testable without a network:
/// success stops the walk, `NoStreams` escalates while a larger level
/// remains, any other error returns immediately, and exhausting the ladder
/// wraps the last error as `all_scan_levels_failed`.
pub(crate) async fn escalate<F, Fut>(
    levels: &[(u64, &str)],
    url: &str,
    mut attempt: F,
) -> ValidateResult
where
    F: FnMut(u64) -> Fut,
    Fut: std::future::Future<Output = ValidateResult>,
{
    let mut last_error = None;
    for (idx, (size_mb, label)) in levels.iter().enumerate() {
        match attempt(*size_mb).await {
            Ok(outcome) => {
                if idx > 0 {
                    info!("{label} scan ({size_mb}MB) succeeded for {url}");
                }
                return Ok(outcome);
            }
            Err(ValidateError::NoStreams) => {
                last_error = Some(ValidateError::NoStreams);
                if let Some((next_mb, next_label)) = levels.get(idx + 1) {
                    info!("escalating to {next_label} scan ({next_mb}MB) for {url}");
                }
            }
            Err(other) => return Err(other),
        }
    }

    let last = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown_error".to_string());
    Err(ValidateError::AllLevelsFailed(last))
}

async fn jitter_sleep(range_secs: (f64, f64)) {
    let secs = rand::rng().random_range(range_secs.0..range_secs.1);
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::auth::Credential;
    use crate::config::SessionArgs;

    struct StubProvider;

    impl CredentialProvider for StubProvider {
        fn load(&self) -> Result<Vec<Credential>> {
            Ok(vec![])
        }
        fn refresh(&self) -> Result<Vec<Credential>> {
            Ok(vec![])
        }
    }

    fn test_validator() -> Validator {
        let args = SessionArgs {
            cookies: PathBuf::from("unused.json"),
            user_agent: "test-agent".into(),
            referer: None,
        };
        let session = Arc::new(Session::new(&args, &[]).expect("session should build"));
        Validator::new(
            session,
            Arc::new(AuthState::new(5)),
            Arc::new(StubProvider),
            false,
        )
    }

    fn outcome(size_mb: u64) -> ValidOutcome {
        ValidOutcome {
            validation_method: format!("{size_mb}MB_scan"),
            fields: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn placeholder_urls_are_rejected_without_network() {
        let validator = test_validator();
        for url in [
            "https://x/no_media_yet",
            "https://x/pdf_or_not_found",
        ] {
            let err = validator
                .validate_url(url, ScanMode::TwoPass, None)
                .await
                .expect_err("placeholder must be rejected");
            assert_eq!(err.to_string(), "skipped_unsolved");
        }
    }

    #[tokio::test]
    async fn custom_mode_requires_a_budget() {
        let validator = test_validator();
        let err = validator
            .validate_url("https://x/doc123.mp4", ScanMode::Custom, None)
            .await
            .expect_err("custom without size must fail");
        assert_eq!(err.to_string(), "custom_size_mb_required");
    }

    #[tokio::test]
    async fn escalation_walks_up_on_no_streams_only() {
        let attempts = AtomicUsize::new(0);
        let result = escalate(&SCAN_LADDER, "https://x/a.mp4", |size_mb| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if size_mb < 200 {
                    Err(ValidateError::NoStreams)
                } else {
                    Ok(outcome(size_mb))
                }
            }
        })
        .await;

        let outcome = result.expect("third level should succeed");
        assert_eq!(outcome.validation_method, "200MB_scan");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_stream_errors_stop_the_ladder() {
        let attempts = AtomicUsize::new(0);
        let result = escalate(&SCAN_LADDER, "https://x/a.mp4", |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(ValidateError::EmptyBody) }
        })
        .await;

        assert_eq!(
            result.expect_err("must fail").to_string(),
            "empty_response_body"
        );
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_ladder_wraps_the_last_error() {
        let result = escalate(&SCAN_LADDER, "https://x/a.mp4", |_| async {
            Err(ValidateError::NoStreams)
        })
        .await;

        assert_eq!(
            result.expect_err("must fail").to_string(),
            "all_scan_levels_failed: no_media_streams"
        );
    }

    #[tokio::test]
    async fn first_level_success_stops_immediately() {
        let attempts = AtomicUsize::new(0);
        let result = escalate(&SCAN_LADDER, "https://x/a.mp4", |size_mb| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Ok(outcome(size_mb)) }
        })
        .await;

        assert_eq!(result.unwrap().validation_method, "5MB_scan");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ladder_is_monotonic() {
        for pair in SCAN_LADDER.windows(2) {
            assert!(pair[0].0 < pair[1].0);
        }
    }
}
