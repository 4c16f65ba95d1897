//! Main application entry point (CLI binary).
//!
//! A thin wrapper around the `media_probe` library: parses arguments,
//! initializes the logger, preflights ffprobe, and prints the run summary.
//! All core functionality lives in the library crate.

use anyhow::{Context, Result};
use clap::Parser;
use std::process;

use media_probe::config::{Cli, Command};
use media_probe::{ffprobe_available, init_logger, run_probe, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.log_level.clone().into(), cli.log_format.clone())
        .context("Failed to initialize logger")?;

    match cli.command {
        Command::Probe(args) => match run_probe(args).await {
            Ok(report) => {
                println!(
                    "Complete: {} media find{} across {} URL{} in {:.1}s",
                    report.finds,
                    if report.finds == 1 { "" } else { "s" },
                    report.total_urls,
                    if report.total_urls == 1 { "" } else { "s" },
                    report.elapsed_seconds
                );
                Ok(())
            }
            Err(e) => {
                eprintln!("media_probe error: {e:#}");
                process::exit(1);
            }
        },
        Command::Validate(args) => {
            if !ffprobe_available().await {
                eprintln!("ffprobe is not installed or not on PATH; install ffmpeg to continue");
                process::exit(1);
            }
            match run_validate(args).await {
                Ok(report) => {
                    println!(
                        "Final results: {} valid, {} invalid out of {} total ({:.1}s)",
                        report.valid, report.invalid, report.total, report.elapsed_seconds
                    );
                    Ok(())
                }
                Err(e) => {
                    eprintln!("media_probe error: {e:#}");
                    process::exit(1);
                }
            }
        }
    }
}
