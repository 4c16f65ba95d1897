//! Configuration types and CLI options.
//!
//! Defines the command-line surface (clap derive) and the enums shared by the
//! library: scan modes, log levels, and log formats.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::constants::{
    DEEP_SCAN_MB, DEFAULT_PROBE_WORKERS, DEFAULT_USER_AGENT, DEFAULT_VALIDATE_WORKERS,
    FAST_SCAN_MB, MANDINGO_SCAN_MB, SAVE_BATCH_SIZE, SUPERDEEP_SCAN_MB,
};

/// Logging level for the application.
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// How many bytes the validator downloads before handing them to ffprobe.
///
/// The single-level modes perform exactly one scan at a fixed (or, for
/// `custom`, user-supplied) budget. `two-pass` walks the full ladder,
/// escalating only when a smaller prefix decodes to zero streams.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ScanMode {
    /// 5 MB partial scan
    Fast,
    /// Auto-escalate: 5 MB -> 100 MB -> 200 MB -> 500 MB
    TwoPass,
    /// 100 MB scan
    Full,
    /// 200 MB scan
    Superdeep,
    /// 500 MB scan
    Mandingo,
    /// User-supplied budget via --size-mb
    Custom,
}

impl ScanMode {
    /// Fixed byte budget in MB for single-level modes. `None` for the ladder
    /// mode and for `custom` (which takes its budget from the CLI).
    pub fn budget_mb(&self) -> Option<u64> {
        match self {
            ScanMode::Fast => Some(FAST_SCAN_MB),
            ScanMode::Full => Some(DEEP_SCAN_MB),
            ScanMode::Superdeep => Some(SUPERDEEP_SCAN_MB),
            ScanMode::Mandingo => Some(MANDINGO_SCAN_MB),
            ScanMode::TwoPass | ScanMode::Custom => None,
        }
    }
}

/// Top-level command-line interface.
#[derive(Debug, Parser)]
#[command(
    name = "media_probe",
    about = "Probe document URL stems for hidden media and validate finds with ffprobe."
)]
pub struct Cli {
    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value = "plain", global = true)]
    pub log_format: LogFormat,

    /// Which stage to run
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands: the two scraper stages.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sweep URL stems across candidate extensions (HEAD existence checks)
    Probe(ProbeArgs),
    /// Validate discovered media URLs with ranged downloads + ffprobe
    Validate(ValidateArgs),
}

/// Options shared by both stages: session identity and credential handling.
#[derive(Debug, Args, Clone)]
pub struct SessionArgs {
    /// Cookie file: a JSON array of {name, value, ...} objects
    #[arg(long, default_value = "cookies.json")]
    pub cookies: PathBuf,

    /// HTTP User-Agent header value
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Referer header sent with every request
    #[arg(long)]
    pub referer: Option<String>,
}

/// Options for the extension probe sweep.
#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Input CSV of scraped URLs (header row, URL in the first column)
    pub input: PathBuf,

    /// Output CSV of probe results
    #[arg(long, default_value = "media_checked_urls.csv")]
    pub output: PathBuf,

    /// Extensions to probe, in priority order (default: .mp4 .mov .jpg .jpeg .png .mp3)
    #[arg(long, value_delimiter = ',')]
    pub extensions: Vec<String>,

    /// Probe the whole extension catalog instead of the priority set
    #[arg(long, conflicts_with = "extensions")]
    pub all_extensions: bool,

    /// Number of concurrent workers [1-100]
    #[arg(long, default_value_t = DEFAULT_PROBE_WORKERS)]
    pub workers: usize,

    /// Skip the final mislabeled-.pdf pass
    #[arg(long)]
    pub skip_pdf_pass: bool,

    /// Session identity and credential options
    #[command(flatten)]
    pub session: SessionArgs,
}

/// Options for metadata validation.
#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Input CSV of probe results (original_url, actual_url, media_type, ...)
    pub input: PathBuf,

    /// Output CSV of validation results
    #[arg(long, default_value = "full_metadata.csv")]
    pub output: PathBuf,

    /// Scan mode
    #[arg(long, value_enum, default_value = "fast")]
    pub mode: ScanMode,

    /// Scan budget in MB for --mode custom
    #[arg(long)]
    pub size_mb: Option<u64>,

    /// Number of concurrent workers [1-100]
    #[arg(long, default_value_t = DEFAULT_VALIDATE_WORKERS)]
    pub workers: usize,

    /// Jittered sleep before each request (helps avoid detection)
    #[arg(long)]
    pub random_sleep: bool,

    /// Flush results to disk every N processed URLs
    #[arg(long, default_value_t = SAVE_BATCH_SIZE)]
    pub batch_size: usize,

    /// Answer prompts with their defaults instead of reading stdin
    #[arg(long)]
    pub assume_yes: bool,

    /// Session identity and credential options
    #[command(flatten)]
    pub session: SessionArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_level_modes_have_fixed_budgets() {
        assert_eq!(ScanMode::Fast.budget_mb(), Some(5));
        assert_eq!(ScanMode::Full.budget_mb(), Some(100));
        assert_eq!(ScanMode::Superdeep.budget_mb(), Some(200));
        assert_eq!(ScanMode::Mandingo.budget_mb(), Some(500));
    }

    #[test]
    fn ladder_and_custom_modes_have_no_fixed_budget() {
        assert_eq!(ScanMode::TwoPass.budget_mb(), None);
        assert_eq!(ScanMode::Custom.budget_mb(), None);
    }

    #[test]
    fn cli_parses_validate_subcommand() {
        let cli = Cli::try_parse_from([
            "media_probe",
            "validate",
            "checked.csv",
            "--mode",
            "two-pass",
            "--workers",
            "20",
        ])
        .expect("CLI should parse");
        match cli.command {
            Command::Validate(args) => {
                assert_eq!(args.mode, ScanMode::TwoPass);
                assert_eq!(args.workers, 20);
            }
            _ => panic!("expected validate subcommand"),
        }
    }
}
