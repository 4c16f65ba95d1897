//! Authenticated session state and the auth-failure-storm protocol.
//!
//! The target site sits behind anti-bot protection: a working cookie set is
//! acquired out of band (a human solves the challenges in a real browser and
//! exports the cookies to a JSON file). This module owns three pieces:
//!
//! - [`Session`]: the shared HTTP client plus the current cookie header. The
//!   cookie header is swapped in place under a lock so in-flight workers pick
//!   up refreshed credentials without reconstructing the client.
//! - [`AuthState`]: a process-wide counter of *consecutive* 401/403 responses.
//!   Any authenticated success resets it. Crossing the threshold means the
//!   cookies are burned and a refresh is required.
//! - [`CredentialProvider`]: the interface to the human-assisted refresh. The
//!   core never knows a browser is involved.
//!
//! Refresh is mutually exclusive: the first worker to hit the threshold takes
//! the refresh lock, re-checks the counter under the lock (workers that were
//! queued behind a refresh see the reset counter and return without a second
//! refresh), performs the blocking reacquisition, swaps the credentials into
//! the live session, and resets the counter.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, REFERER};
use serde::{Deserialize, Serialize};

use crate::config::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, SessionArgs};
use crate::prompt;

/// One cookie-equivalent credential. Extra fields from browser exports
/// (domain, path, expiry, ...) are preserved across rewrites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Any remaining fields from the browser export, passed through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Produces a fresh, valid credential set on demand.
///
/// Implementations may block on human interaction; callers in async context
/// must wrap calls in `tokio::task::block_in_place`.
pub trait CredentialProvider: Send + Sync {
    /// Returns the current credential set, acquiring one if none exists.
    fn load(&self) -> Result<Vec<Credential>>;

    /// Forces reacquisition of a fresh credential set.
    fn refresh(&self) -> Result<Vec<Credential>>;
}

/// File-backed provider: credentials live in a JSON array on disk, produced
/// by the out-of-band browser flow. A refresh asks the operator to change
/// VPN exit, redo the browser challenge, re-export the file, and press Enter.
pub struct FileCredentialProvider {
    path: PathBuf,
}

impl FileCredentialProvider {
    /// Creates a provider reading from `path`.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_file(&self) -> Result<Vec<Credential>> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read cookie file {}", self.path.display()))?;
        let creds: Vec<Credential> = serde_json::from_str(&raw)
            .with_context(|| format!("cookie file {} is not a JSON array", self.path.display()))?;
        Ok(creds)
    }
}

impl CredentialProvider for FileCredentialProvider {
    fn load(&self) -> Result<Vec<Credential>> {
        if self.path.exists() {
            let creds = self.read_file()?;
            info!(
                "Loaded {} cookies from {}",
                creds.len(),
                self.path.display()
            );
            return Ok(creds);
        }
        warn!("No cookie file at {}", self.path.display());
        self.refresh()
    }

    fn refresh(&self) -> Result<Vec<Credential>> {
        println!("\n*** BOT BLOCKED - HUMAN INTERVENTION REQUIRED ***");
        println!("1. Change your VPN exit IP.");
        println!("2. Open the site in a browser and solve the anti-bot challenges.");
        println!(
            "3. Export the cookies to {} (JSON array of {{name, value}}).",
            self.path.display()
        );
        prompt::wait_for_enter("Press Enter when the cookie file is updated... ");
        let creds = self.read_file()?;
        info!("Cookies refreshed ({} entries), resuming", creds.len());
        Ok(creds)
    }
}

/// Shared authenticated HTTP session.
///
/// The `reqwest::Client` is immutable; the cookie header is the only mutable
/// credential state and is swapped atomically on refresh.
pub struct Session {
    client: reqwest::Client,
    cookie_header: RwLock<String>,
}

fn join_cookie_header(credentials: &[Credential]) -> String {
    credentials
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

impl Session {
    /// Builds the session client and installs the initial credential set.
    ///
    /// No whole-request timeout is set: ranged downloads of hundreds of MB are
    /// expected to run for minutes. Stalls are bounded by the read timeout.
    pub fn new(args: &SessionArgs, credentials: &[Credential]) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(referer) = &args.referer {
            headers.insert(
                REFERER,
                HeaderValue::from_str(referer).context("invalid --referer value")?,
            );
        }

        let client = reqwest::ClientBuilder::new()
            .user_agent(args.user_agent.clone())
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .read_timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            cookie_header: RwLock::new(join_cookie_header(credentials)),
        })
    }

    /// Starts a GET request with the current cookie header attached.
    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.attach_cookies(self.client.get(url))
    }

    /// Starts a HEAD request with the current cookie header attached.
    pub fn head(&self, url: &str) -> reqwest::RequestBuilder {
        self.attach_cookies(self.client.head(url))
    }

    /// Swaps a fresh credential set into the live session.
    pub fn install(&self, credentials: &[Credential]) {
        let header = join_cookie_header(credentials);
        let mut guard = self
            .cookie_header
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = header;
    }

    fn attach_cookies(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let header = self
            .cookie_header
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if header.is_empty() {
            builder
        } else {
            builder.header(COOKIE, header)
        }
    }
}

/// Process-wide consecutive auth-failure counter plus the refresh guard.
pub struct AuthState {
    consecutive_failures: AtomicU32,
    threshold: u32,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl AuthState {
    /// Creates a counter that triggers recovery at `threshold` consecutive failures.
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            threshold,
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Records one 401/403 response and returns the new consecutive count.
    pub fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Resets the counter after any authenticated success.
    pub fn reset(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// The configured storm threshold.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Whether the counter has reached the storm threshold.
    pub fn at_threshold(&self) -> bool {
        self.consecutive_failures.load(Ordering::SeqCst) >= self.threshold
    }

    /// Runs the storm recovery protocol: take the refresh lock, re-check the
    /// counter under it, and only then perform the blocking credential
    /// reacquisition and swap. Workers queued behind an in-progress refresh
    /// observe the reset counter and return without refreshing again, so a
    /// burst of M >= threshold concurrent failures produces exactly one
    /// refresh.
    pub async fn recover(
        &self,
        session: &Session,
        provider: &dyn CredentialProvider,
    ) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        if !self.at_threshold() {
            return Ok(());
        }

        warn!(
            "{} consecutive auth failures - refreshing credentials",
            self.consecutive_failures.load(Ordering::SeqCst)
        );
        let credentials = tokio::task::block_in_place(|| provider.refresh())?;
        session.install(&credentials);
        self.reset();
        Ok(())
    }
}
