//! media_probe library: probe document URL stems for hidden media and
//! validate finds with ffprobe over ranged downloads.
//!
//! Two cooperating stages share an authenticated session against a
//! bot-protected site:
//!
//! - the **probe sweeper** walks URL stems across a catalog of candidate
//!   extensions with HEAD existence checks, surfacing media hidden behind
//!   generic document links;
//! - the **escalating validator** downloads a byte prefix of each find,
//!   inspects it with ffprobe, and escalates the probe size when a small
//!   prefix decodes to zero streams.
//!
//! Outcomes persist to flat CSV snapshots keyed by resolved URL, so runs are
//! resumable and idempotent. Bursts of 401/403 responses trigger a single
//! human-assisted credential refresh shared by all workers.
//!
//! # Example
//!
//! ```no_run
//! use clap::Parser;
//! use media_probe::config::{Cli, Command};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let cli = Cli::parse_from(["media_probe", "validate", "checked.csv", "--mode", "two-pass"]);
//! if let Command::Validate(args) = cli.command {
//!     let report = media_probe::run_validate(args).await?;
//!     println!("{} valid, {} invalid", report.valid, report.invalid);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod auth;
pub mod config;
pub mod fetch;
pub mod inspect;
pub mod logging;
pub mod probe;
pub mod prompt;
pub mod run;
pub mod store;
pub mod validate;

// Re-export public API
pub use config::{Cli, Command, LogFormat, LogLevel, ScanMode};
pub use inspect::ffprobe_available;
pub use logging::init_logger;
pub use run::{run_probe, run_validate, ProbeReport, ValidateReport};
