//! Configuration constants.
//!
//! Defaults for scan sizes, auth-storm thresholds, timeouts, and batching.
//! Most of these can be overridden from the command line.

/// Bytes downloaded per megabyte of scan budget.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Fast scan budget in MB (first ladder level).
pub const FAST_SCAN_MB: u64 = 5;
/// Deep scan budget in MB.
pub const DEEP_SCAN_MB: u64 = 100;
/// Superdeep scan budget in MB.
pub const SUPERDEEP_SCAN_MB: u64 = 200;
/// Mandingo scan budget in MB (last ladder level).
pub const MANDINGO_SCAN_MB: u64 = 500;

/// Consecutive 401/403 responses before the validator forces a credential refresh.
pub const VALIDATE_AUTH_THRESHOLD: u32 = 5;
/// Consecutive 401 responses before the probe sweeper forces a credential refresh.
/// Higher than the validator's threshold: HEAD probes are cheap and a stem left
/// unresolved is retried on a later pass anyway.
pub const PROBE_AUTH_THRESHOLD: u32 = 10;

/// TCP connect timeout in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;
/// Read-inactivity timeout in seconds. Ranged downloads of hundreds of MB can
/// legitimately take minutes, so there is no whole-request timeout; a stalled
/// socket is cut after this long instead.
pub const READ_TIMEOUT_SECS: u64 = 60;
/// ffprobe invocation timeout in seconds.
pub const FFPROBE_TIMEOUT_SECS: u64 = 60;

/// Flush the result store after this many processed items.
pub const SAVE_BATCH_SIZE: usize = 50;
/// Flush the probe store after this many probe attempts within one extension pass.
pub const PROBE_SAVE_INTERVAL: usize = 250;

/// HEAD responses with a Content-Length below this are recorded as `tiny_file`.
pub const TINY_FILE_THRESHOLD_BYTES: u64 = 100 * 1024;

/// Default worker pool size for validation.
pub const DEFAULT_VALIDATE_WORKERS: usize = 15;
/// Default worker pool size for extension probing.
pub const DEFAULT_PROBE_WORKERS: usize = 5;
/// Hard cap on the worker pool size.
pub const MAX_WORKERS: usize = 100;

/// Placeholder media type for stems that no probe pass has resolved yet.
pub const NO_MEDIA_YET: &str = "no_media_yet";
/// Placeholder media type for stems confirmed to be a plain document or absent.
pub const PDF_OR_NOT_FOUND: &str = "pdf_or_not_found";

/// Jittered pre-request delay bounds in seconds (validator, when enabled).
pub const VALIDATE_SLEEP_RANGE_SECS: (f64, f64) = (0.5, 1.5);
/// Jittered retry delay bounds in seconds after a below-threshold auth failure.
pub const AUTH_RETRY_SLEEP_RANGE_SECS: (f64, f64) = (1.0, 3.0);
/// Mandatory jittered delay bounds in seconds after every probe attempt.
pub const PROBE_SLEEP_RANGE_SECS: (f64, f64) = (0.5, 2.0);

/// Default User-Agent header. Matches a current desktop Chrome; override with
/// `--user-agent` if the target starts rejecting it.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Extensions probed when none are given on the command line, in priority order.
pub const DEFAULT_EXTENSIONS: [&str; 6] = [".mp4", ".mov", ".jpg", ".jpeg", ".png", ".mp3"];

/// Full catalog of extensions worth probing, in priority order.
pub const ALL_EXTENSIONS: [&str; 52] = [
    // Video
    ".mp4", ".mov", ".webm", ".avi", ".mkv", ".m4v", ".3gp", ".3g2", ".flv", ".f4v", ".wmv",
    ".asf", ".ogv", ".m2ts", ".mts", ".ts", ".qt", ".mxf", ".vob", ".dv", ".mod", ".tod", ".rm",
    ".rmvb", ".divx",
    // Audio
    ".mp3", ".wav", ".ogg", ".m4a", ".m4b", ".aac", ".opus", ".wma", ".aiff", ".flac", ".amr",
    ".caf", ".mka", ".mid",
    // Images
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".tif", ".webp", ".heic", ".heif", ".ico",
    ".tga", ".psd",
];
