//! Probe sweeper: extension discovery over URL stems.
//!
//! Document dumps sometimes hide media behind a generic `.pdf` link: the same
//! stem also answers for `doc123.mp4`. For each stem and each candidate
//! extension the sweeper issues one HEAD request and classifies the response.
//! Classification is a pure function over (status, content type, length) so
//! the policy is testable without a network.
//!
//! A 401 counts toward the shared auth storm but the attempt itself is not
//! retried in place: the stem simply stays unresolved and a later pass picks
//! it up. The sweep is idempotent per stem, so leaving the retry to the next
//! pass is cheaper than stalling a whole extension pass behind one blocked
//! stem (the validator, whose per-URL work is expensive, retries in place
//! instead).

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use rand::Rng;

use crate::auth::{AuthState, CredentialProvider, Session};
use crate::config::{PROBE_SLEEP_RANGE_SECS, TINY_FILE_THRESHOLD_BYTES};
use crate::fetch::{self, FetchError, HeadSnapshot};

/// A media find at a probed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFind {
    /// The URL that answered (after redirects)
    pub actual_url: String,
    /// Confirmed content type, or `tiny_file` for low-trust finds
    pub media_type: String,
    /// Observed byte length from Content-Length
    pub size_bytes: u64,
}

impl ProbeFind {
    /// Whether the find is below the trust threshold.
    pub fn is_tiny(&self) -> bool {
        self.size_bytes < TINY_FILE_THRESHOLD_BYTES
    }
}

/// Classifies one HEAD snapshot.
///
/// - 200 with a body under 100 KiB is `tiny_file` regardless of content type:
///   a find worth recording, but too small to be trusted as real media.
/// - 200 with >= 100 KiB and a `video/`, `image/` or `audio/` content type is
///   a confirmed find.
/// - Everything else is no result at this extension.
pub fn classify_head(snapshot: &HeadSnapshot) -> Option<ProbeFind> {
    if snapshot.status != 200 {
        return None;
    }
    let size = snapshot.content_length.unwrap_or(0);

    if size < TINY_FILE_THRESHOLD_BYTES {
        return Some(ProbeFind {
            actual_url: snapshot.final_url.clone(),
            media_type: "tiny_file".to_string(),
            size_bytes: size,
        });
    }

    if ["video/", "image/", "audio/"]
        .iter()
        .any(|prefix| snapshot.content_type.contains(prefix))
    {
        return Some(ProbeFind {
            actual_url: snapshot.final_url.clone(),
            media_type: snapshot.content_type.clone(),
            size_bytes: size,
        });
    }

    None
}

/// Issues existence probes for stem/extension candidates. Shared by all pool
/// workers.
pub struct ProbeSweeper {
    session: Arc<Session>,
    auth: Arc<AuthState>,
    provider: Arc<dyn CredentialProvider>,
}

impl ProbeSweeper {
    /// Creates a sweeper over a live session.
    pub fn new(
        session: Arc<Session>,
        auth: Arc<AuthState>,
        provider: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            session,
            auth,
            provider,
        }
    }

    /// Probes `stem + ext` with one HEAD request and classifies the answer.
    ///
    /// Every attempt, whatever its outcome, is followed by a mandatory
    /// jittered delay so the request rate stays bounded.
    pub async fn probe_extension(&self, stem: &str, ext: &str) -> Option<ProbeFind> {
        let result = self.probe_inner(stem, ext).await;
        jitter_sleep(PROBE_SLEEP_RANGE_SECS).await;
        result
    }

    async fn probe_inner(&self, stem: &str, ext: &str) -> Option<ProbeFind> {
        let candidate = format!("{stem}{ext}");
        let snapshot = match fetch::head(&self.session, &candidate).await {
            Ok(snapshot) => snapshot,
            Err(FetchError::Transport(e)) => {
                debug!("probe error {ext} {candidate}: {e}");
                return None;
            }
            // head() only fails at the wire level
            Err(_) => return None,
        };

        if snapshot.status == 401 {
            let burst = self.auth.record_failure();
            warn!(
                "401 burst {burst}/{} probing {candidate}",
                self.auth.threshold()
            );
            if self.auth.at_threshold() {
                if let Err(e) = self
                    .auth
                    .recover(&self.session, self.provider.as_ref())
                    .await
                {
                    warn!("credential refresh failed: {e:#}");
                }
            }
            return None;
        }

        // Any completed non-401 exchange proves the credentials still work.
        self.auth.reset();

        let find = classify_head(&snapshot);
        match &find {
            Some(f) if f.media_type == "tiny_file" => {
                debug!("tiny {}B {ext} {stem}", f.size_bytes);
            }
            Some(f) => {
                debug!("valid {} ({} bytes) {}", f.media_type, f.size_bytes, f.actual_url);
            }
            None => {
                debug!("no result {ext} {stem} (status {})", snapshot.status);
            }
        }
        find
    }
}

/// Strips the final extension from a URL, producing its probe stem.
pub fn url_stem(url: &str) -> &str {
    url.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(url)
}

async fn jitter_sleep(range_secs: (f64, f64)) {
    let secs = rand::rng().random_range(range_secs.0..range_secs.1);
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}
