//! Run orchestration: worker pools, batching, and the iterative rescan loop.
//!
//! Both stages share the same shape: load persisted state, compute the
//! remaining work, fan it out over a bounded pool of spawned tasks, merge
//! outcomes into the store in completion order, and flush in batches. The
//! submission loop drains completions whenever the pool is full, so merging
//! and the periodic flush keep pace with the workers instead of waiting for
//! the whole queue to be submitted. Individual failures never abort a run;
//! they are recorded as data and the batch continues.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::{info, warn};
use tokio::task::JoinError;

use crate::auth::{AuthState, CredentialProvider, FileCredentialProvider, Session};
use crate::config::{
    ALL_EXTENSIONS, DEFAULT_EXTENSIONS, MAX_WORKERS, NO_MEDIA_YET, PDF_OR_NOT_FOUND,
    PROBE_AUTH_THRESHOLD, PROBE_SAVE_INTERVAL, ProbeArgs, ScanMode, VALIDATE_AUTH_THRESHOLD,
    ValidateArgs,
};
use crate::probe::{url_stem, ProbeFind, ProbeSweeper};
use crate::prompt;
use crate::store::{self, ResultStore, UrlRecord};
use crate::validate::{ValidateResult, Validator};

/// Summary of a completed validation run.
#[derive(Debug, Clone)]
pub struct ValidateReport {
    /// Records in the store at the end of the run
    pub total: usize,
    /// Records marked valid
    pub valid: usize,
    /// Records marked invalid
    pub invalid: usize,
    /// Elapsed time in seconds
    pub elapsed_seconds: f64,
}

/// Summary of a completed probe sweep.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// URLs in the input seed list
    pub total_urls: usize,
    /// Stems with a recorded media find
    pub finds: usize,
    /// Elapsed time in seconds
    pub elapsed_seconds: f64,
}

fn is_placeholder(media_type: &str) -> bool {
    media_type == NO_MEDIA_YET || media_type == PDF_OR_NOT_FOUND
}

/// Computes the remaining work for one validation pass.
///
/// A source row is queued when the store has no outcome for its key, or, when
/// `include_invalid` is set, when the stored outcome is invalid. Already-valid
/// records are never re-queued, which is what makes a restarted run resume
/// without duplicate work.
pub fn build_queue(
    source: &[UrlRecord],
    store: &ResultStore,
    include_invalid: bool,
) -> Vec<UrlRecord> {
    source
        .iter()
        .filter(|row| {
            let Some(key) = row.key() else { return false };
            match store.get(key) {
                None => true,
                Some(existing) => include_invalid && !existing.is_valid(),
            }
        })
        .cloned()
        .collect()
}

/// Folds a validation outcome into the source row, producing the record to
/// persist. Failures are captured as data in the `error` column.
fn outcome_record(mut row: UrlRecord, outcome: ValidateResult) -> UrlRecord {
    match outcome {
        Ok(valid) => {
            row.set("is_valid", "true");
            row.set("validation_method", valid.validation_method);
            row.extend(valid.fields);
        }
        Err(e) => {
            row.set("is_valid", "false");
            row.set("error", e.to_string());
        }
    }
    row
}

fn basename(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Runs the metadata validation stage.
pub async fn run_validate(args: ValidateArgs) -> Result<ValidateReport> {
    if args.mode == ScanMode::Custom && args.size_mb.is_none() {
        bail!("--mode custom requires --size-mb");
    }
    if let Some(size_mb) = args.size_mb {
        if size_mb == 0 {
            bail!("--size-mb must be greater than 0");
        }
    }
    let workers = args.workers.clamp(1, MAX_WORKERS);
    let start = Instant::now();

    let mut store = ResultStore::load(&args.output)?;
    if !store.is_empty() {
        info!(
            "Resuming: {} records ({} valid, {} invalid)",
            store.len(),
            store.valid_count(),
            store.invalid_count()
        );
    }

    let source_rows: Vec<UrlRecord> = store::read_rows(&args.input)
        .context("failed to read input table")?
        .into_iter()
        .filter(|row| row.key().is_some())
        .filter(|row| !row.media_type().map(is_placeholder).unwrap_or(false))
        .collect();
    info!("{} candidate URLs in {}", source_rows.len(), args.input.display());

    let provider: Arc<dyn CredentialProvider> =
        Arc::new(FileCredentialProvider::new(args.session.cookies.clone()));
    let credentials = tokio::task::block_in_place(|| provider.load())?;
    let session = Arc::new(Session::new(&args.session, &credentials)?);
    let auth = Arc::new(AuthState::new(VALIDATE_AUTH_THRESHOLD));
    let validator = Arc::new(Validator::new(
        Arc::clone(&session),
        Arc::clone(&auth),
        Arc::clone(&provider),
        args.random_sleep,
    ));

    let mut mode = args.mode;
    let mut include_invalid = false;
    let mut iteration = 1usize;
    loop {
        let queue = build_queue(&source_rows, &store, include_invalid);
        if queue.is_empty() {
            let invalid = store.invalid_count();
            if invalid == 0 || include_invalid {
                info!("Nothing left to scan");
                break;
            }
            let rescan = tokio::task::block_in_place(|| {
                prompt::confirm(
                    &format!("No new URLs to scan. Rescan {invalid} invalid files?"),
                    false,
                    args.assume_yes,
                )
            });
            if !rescan {
                break;
            }
            mode = tokio::task::block_in_place(|| choose_rescan_mode(mode, args.assume_yes));
            include_invalid = true;
            continue;
        }

        info!(
            "Iteration {iteration}: scanning {} URLs ({:?} mode, {workers} workers)",
            queue.len(),
            mode
        );
        process_validation_batch(
            queue,
            Arc::clone(&validator),
            mode,
            args.size_mb,
            workers,
            args.batch_size.max(1),
            &mut store,
        )
        .await?;
        store.flush()?;

        info!(
            "Results: {} valid, {} invalid out of {} total",
            store.valid_count(),
            store.invalid_count(),
            store.len()
        );
        if store.invalid_count() == 0 {
            info!("All files validated successfully");
            break;
        }
        let again = tokio::task::block_in_place(|| {
            prompt::confirm(
                &format!("Rescan {} invalid files?", store.invalid_count()),
                false,
                args.assume_yes,
            )
        });
        if !again {
            break;
        }
        mode = tokio::task::block_in_place(|| choose_rescan_mode(mode, args.assume_yes));
        include_invalid = true;
        iteration += 1;
    }

    Ok(ValidateReport {
        total: store.len(),
        valid: store.valid_count(),
        invalid: store.invalid_count(),
        elapsed_seconds: start.elapsed().as_secs_f64(),
    })
}

/// Re-selects the scan mode between iterations; the common flow is a fast
/// first sweep followed by deeper rescans of whatever failed. Non-interactive
/// runs keep the current mode.
fn choose_rescan_mode(current: ScanMode, assume_current: bool) -> ScanMode {
    if assume_current {
        return current;
    }
    let answer = prompt::ask(&format!(
        "Scan mode for this pass [fast, two-pass, full, superdeep, mandingo] \
         (Enter keeps {current:?}):"
    ));
    parse_rescan_mode(&answer, current)
}

/// `custom` is not offered on rescan: its byte budget is fixed at launch, so
/// re-selecting it mid-run could not change anything.
fn parse_rescan_mode(answer: &str, current: ScanMode) -> ScanMode {
    if answer.is_empty() {
        return current;
    }
    match ScanMode::from_str(answer, true) {
        Ok(ScanMode::Custom) | Err(_) => {
            warn!("Unrecognized rescan mode {answer:?}, keeping {current:?}");
            current
        }
        Ok(mode) => mode,
    }
}

/// Fans one batch out over the pool and merges outcomes in completion order.
///
/// At most `workers` validations are in flight; once the pool is full the
/// submission loop drains a completion before spawning the next row, so the
/// batched flush runs throughout and a crash loses at most the unflushed
/// tail of the current batch.
async fn process_validation_batch(
    queue: Vec<UrlRecord>,
    validator: Arc<Validator>,
    mode: ScanMode,
    custom_size_mb: Option<u64>,
    workers: usize,
    batch_size: usize,
    store: &mut ResultStore,
) -> Result<()> {
    let total = queue.len();
    let mut tasks = FuturesUnordered::new();
    let mut processed = 0usize;

    for row in queue {
        while tasks.len() >= workers {
            let Some(joined) = tasks.next().await else { break };
            merge_completion(joined, &mut processed, total, batch_size, store)?;
        }
        let validator = Arc::clone(&validator);
        tasks.push(tokio::spawn(async move {
            let url = row.get("actual_url").unwrap_or("").to_string();
            let outcome = validator.validate_url(&url, mode, custom_size_mb).await;
            (row, outcome)
        }));
    }
    while let Some(joined) = tasks.next().await {
        merge_completion(joined, &mut processed, total, batch_size, store)?;
    }
    Ok(())
}

/// Merges one finished validation into the store, flushing on the batch
/// cadence.
fn merge_completion(
    joined: Result<(UrlRecord, ValidateResult), JoinError>,
    processed: &mut usize,
    total: usize,
    batch_size: usize,
    store: &mut ResultStore,
) -> Result<()> {
    *processed += 1;
    match joined {
        Ok((row, outcome)) => {
            let ok = outcome.is_ok();
            let record = outcome_record(row, outcome);
            info!(
                "({}/{total}) {} {}",
                *processed,
                if ok { "valid" } else { "invalid" },
                basename(record.get("actual_url").unwrap_or(""))
            );
            store.merge(record);
            if *processed % batch_size == 0 {
                store.flush()?;
            }
        }
        Err(join_error) => {
            warn!("validator task panicked: {join_error:?}");
        }
    }
    Ok(())
}

/// Runs the extension probe sweep.
pub async fn run_probe(args: ProbeArgs) -> Result<ProbeReport> {
    let workers = args.workers.clamp(1, MAX_WORKERS);
    let start = Instant::now();

    let urls = store::read_url_list(&args.input).context("failed to read input URL list")?;
    info!("Loaded {} URLs to probe", urls.len());

    let mut finds = load_probe_finds(&args.output)?;
    if !finds.is_empty() {
        info!("Resumed from existing output: {} stems already resolved", finds.len());
    }

    let extensions = resolve_extensions(&args)?;
    info!("Probing extensions: {}", extensions.join(", "));

    let provider: Arc<dyn CredentialProvider> =
        Arc::new(FileCredentialProvider::new(args.session.cookies.clone()));
    let credentials = tokio::task::block_in_place(|| provider.load())?;
    let session = Arc::new(Session::new(&args.session, &credentials)?);
    let auth = Arc::new(AuthState::new(PROBE_AUTH_THRESHOLD));
    let sweeper = Arc::new(ProbeSweeper::new(session, auth, provider));

    for ext in &extensions {
        let stems = pending_stems(&urls, &finds);
        if stems.is_empty() {
            info!("Skipping {ext}: all stems resolved");
            continue;
        }
        info!("Probing {} stems for {ext}", stems.len());
        let new_finds =
            sweep_extension(&sweeper, stems, ext, workers, &mut finds, &urls, &args.output).await?;
        info!("Found {new_finds} new with {ext} (total finds: {})", finds.len());
        write_probe_snapshot(&args.output, &urls, &finds)?;
    }

    // Mislabeled-.pdf pass: the original URL itself may already be media
    // served under the wrong extension.
    if !args.skip_pdf_pass {
        let stems = pending_stems(&urls, &finds);
        if !stems.is_empty() {
            info!("Checking {} original .pdf URLs for mislabeled media", stems.len());
            let mislabeled =
                sweep_extension(&sweeper, stems, ".pdf", workers, &mut finds, &urls, &args.output)
                    .await?;
            info!("Found {mislabeled} mislabeled .pdf files");
        }
    }

    write_probe_snapshot(&args.output, &urls, &finds)?;
    Ok(ProbeReport {
        total_urls: urls.len(),
        finds: finds.len(),
        elapsed_seconds: start.elapsed().as_secs_f64(),
    })
}

/// Stems of `.pdf` seed URLs that no pass has resolved yet.
fn pending_stems(urls: &[String], finds: &HashMap<String, ProbeFind>) -> Vec<String> {
    urls.iter()
        .filter(|u| u.to_ascii_lowercase().ends_with(".pdf"))
        .map(|u| url_stem(u).to_string())
        .filter(|stem| !finds.contains_key(stem))
        .collect()
}

fn resolve_extensions(args: &ProbeArgs) -> Result<Vec<String>> {
    if args.all_extensions {
        return Ok(ALL_EXTENSIONS.iter().map(|e| e.to_string()).collect());
    }
    if args.extensions.is_empty() {
        return Ok(DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect());
    }
    args.extensions
        .iter()
        .map(|ext| {
            let ext = ext.trim();
            if ext.is_empty() {
                bail!("empty extension in --extensions");
            }
            Ok(if ext.starts_with('.') {
                ext.to_string()
            } else {
                format!(".{ext}")
            })
        })
        .collect()
}

/// Sweeps one extension across the stem set on the worker pool.
///
/// Same interleaved shape as the validation pool: completions are recorded
/// (and snapshotted on the save interval) while later stems are still being
/// submitted.
async fn sweep_extension(
    sweeper: &Arc<ProbeSweeper>,
    stems: Vec<String>,
    ext: &str,
    workers: usize,
    finds: &mut HashMap<String, ProbeFind>,
    urls: &[String],
    output: &Path,
) -> Result<usize> {
    let mut tasks = FuturesUnordered::new();
    let mut attempts = 0usize;
    let mut new_finds = 0usize;

    for stem in stems {
        while tasks.len() >= workers {
            let Some(joined) = tasks.next().await else { break };
            record_completion(joined, ext, &mut attempts, &mut new_finds, finds);
            if attempts % PROBE_SAVE_INTERVAL == 0 {
                write_probe_snapshot(output, urls, finds)?;
            }
        }
        let sweeper = Arc::clone(sweeper);
        let ext = ext.to_string();
        tasks.push(tokio::spawn(async move {
            let find = sweeper.probe_extension(&stem, &ext).await;
            (stem, find)
        }));
    }
    while let Some(joined) = tasks.next().await {
        record_completion(joined, ext, &mut attempts, &mut new_finds, finds);
        if attempts % PROBE_SAVE_INTERVAL == 0 {
            write_probe_snapshot(output, urls, finds)?;
        }
    }
    Ok(new_finds)
}

/// Records one finished probe attempt.
fn record_completion(
    joined: Result<(String, Option<ProbeFind>), JoinError>,
    ext: &str,
    attempts: &mut usize,
    new_finds: &mut usize,
    finds: &mut HashMap<String, ProbeFind>,
) {
    *attempts += 1;
    match joined {
        Ok((stem, Some(find))) => {
            info!("Found: {stem}{ext} -> {}", find.media_type);
            finds.insert(stem, find);
            *new_finds += 1;
        }
        Ok((_, None)) => {}
        Err(join_error) => {
            warn!("probe task panicked: {join_error:?}");
        }
    }
}

/// Loads resolved stems from a previous probe run's output.
fn load_probe_finds(output: &Path) -> Result<HashMap<String, ProbeFind>> {
    let store = ResultStore::load(output)?;
    let mut finds = HashMap::new();
    for record in store.records() {
        let Some(media_type) = record.media_type() else { continue };
        if is_placeholder(media_type) {
            continue;
        }
        let Some(original) = record.get("original_url") else { continue };
        let Some(actual) = record.get("actual_url") else { continue };
        let size_bytes = record
            .get("size_bytes")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        finds.insert(
            url_stem(original).to_string(),
            ProbeFind {
                actual_url: actual.to_string(),
                media_type: media_type.to_string(),
                size_bytes,
            },
        );
    }
    Ok(finds)
}

/// Rewrites the probe output: one row per seed URL, resolved stems carry
/// their find, the rest stay `no_media_yet`.
fn write_probe_snapshot(
    output: &Path,
    urls: &[String],
    finds: &HashMap<String, ProbeFind>,
) -> Result<()> {
    let mut snapshot = ResultStore::new(output.to_path_buf());
    for url in urls {
        let mut record = UrlRecord::new();
        record.set("original_url", url);
        match finds.get(url_stem(url)) {
            Some(find) => {
                record.set("actual_url", &find.actual_url);
                record.set("media_type", &find.media_type);
                record.set("size_bytes", find.size_bytes.to_string());
                record.set("is_tiny", if find.is_tiny() { "true" } else { "false" });
            }
            None => {
                record.set("actual_url", url);
                record.set("media_type", NO_MEDIA_YET);
                record.set("size_bytes", "-1");
                record.set("is_tiny", "false");
            }
        }
        snapshot.merge(record);
    }
    snapshot.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{ValidOutcome, ValidateError};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn record(pairs: &[(&str, &str)]) -> UrlRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn queue_skips_already_validated_urls() {
        let dir = tempdir().unwrap();
        let mut store = ResultStore::load(&dir.path().join("out.csv")).unwrap();
        store.merge(record(&[("actual_url", "https://x/a.mp4"), ("is_valid", "true")]));
        store.merge(record(&[("actual_url", "https://x/b.mp4"), ("is_valid", "false")]));

        let source = vec![
            record(&[("actual_url", "https://x/a.mp4")]),
            record(&[("actual_url", "https://x/b.mp4")]),
            record(&[("actual_url", "https://x/c.mp4")]),
        ];

        let fresh = build_queue(&source, &store, false);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].key(), Some("https://x/c.mp4"));

        let with_invalid = build_queue(&source, &store, true);
        let keys: Vec<_> = with_invalid.iter().filter_map(|r| r.key()).collect();
        assert_eq!(keys, vec!["https://x/b.mp4", "https://x/c.mp4"]);
    }

    #[test]
    fn queue_drops_rows_without_a_key() {
        let dir = tempdir().unwrap();
        let store = ResultStore::load(&dir.path().join("out.csv")).unwrap();
        let source = vec![record(&[("original_url", "https://x/a.pdf")])];
        assert!(build_queue(&source, &store, false).is_empty());
    }

    #[test]
    fn outcome_record_captures_success_fields() {
        let row = record(&[
            ("actual_url", "https://x/a.mp4"),
            ("media_type", "video/mp4"),
        ]);
        let mut fields = BTreeMap::new();
        fields.insert("file_size_bytes".to_string(), "5242880".to_string());
        fields.insert("stream_0_video_codec_name".to_string(), "h264".to_string());

        let merged = outcome_record(
            row,
            Ok(ValidOutcome {
                validation_method: "5MB_scan".to_string(),
                fields,
            }),
        );
        assert!(merged.is_valid());
        assert_eq!(merged.get("validation_method"), Some("5MB_scan"));
        assert_eq!(merged.get("file_size_bytes"), Some("5242880"));
        assert_eq!(merged.get("media_type"), Some("video/mp4"));
    }

    #[test]
    fn outcome_record_captures_error_as_data() {
        let row = record(&[("actual_url", "https://x/a.mp4")]);
        let merged = outcome_record(row, Err(ValidateError::NoStreams));
        assert!(!merged.is_valid());
        assert_eq!(merged.get("error"), Some("no_media_streams"));
    }

    #[test]
    fn pending_stems_filters_resolved_and_non_pdf() {
        let urls = vec![
            "https://x/a.pdf".to_string(),
            "https://x/b.PDF".to_string(),
            "https://x/c.jpg".to_string(),
        ];
        let mut finds = HashMap::new();
        finds.insert(
            "https://x/a".to_string(),
            ProbeFind {
                actual_url: "https://x/a.mp4".to_string(),
                media_type: "video/mp4".to_string(),
                size_bytes: 1_000_000,
            },
        );

        let stems = pending_stems(&urls, &finds);
        assert_eq!(stems, vec!["https://x/b".to_string()]);
    }

    #[test]
    fn probe_snapshot_round_trips_through_load() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("checked.csv");
        let urls = vec!["https://x/a.pdf".to_string(), "https://x/b.pdf".to_string()];
        let mut finds = HashMap::new();
        finds.insert(
            "https://x/a".to_string(),
            ProbeFind {
                actual_url: "https://x/a.mp4".to_string(),
                media_type: "video/mp4".to_string(),
                size_bytes: 5_242_880,
            },
        );

        write_probe_snapshot(&output, &urls, &finds).unwrap();
        let reloaded = load_probe_finds(&output).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("https://x/a"), finds.get("https://x/a"));
    }

    #[test]
    fn probe_snapshot_columns_follow_discovery_order() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("checked.csv");
        let urls = vec!["https://x/a.pdf".to_string()];
        let mut finds = HashMap::new();
        finds.insert(
            "https://x/a".to_string(),
            ProbeFind {
                actual_url: "https://x/a.mp4".to_string(),
                media_type: "video/mp4".to_string(),
                size_bytes: 5_242_880,
            },
        );

        write_probe_snapshot(&output, &urls, &finds).unwrap();
        let text = std::fs::read_to_string(&output).unwrap();
        assert_eq!(
            text.lines().next().unwrap(),
            "original_url,actual_url,media_type,size_bytes,is_tiny"
        );
    }

    #[test]
    fn rescan_mode_accepts_names_and_keeps_current_otherwise() {
        assert_eq!(parse_rescan_mode("", ScanMode::Fast), ScanMode::Fast);
        assert_eq!(
            parse_rescan_mode("two-pass", ScanMode::Fast),
            ScanMode::TwoPass
        );
        assert_eq!(
            parse_rescan_mode("SUPERDEEP", ScanMode::Fast),
            ScanMode::Superdeep
        );
        // Custom has no budget to re-enter mid-run, so it cannot be selected.
        assert_eq!(parse_rescan_mode("custom", ScanMode::Fast), ScanMode::Fast);
        assert_eq!(parse_rescan_mode("bogus", ScanMode::Full), ScanMode::Full);
    }

    #[test]
    fn extensions_normalize_leading_dot() {
        let args = ProbeArgs {
            input: "in.csv".into(),
            output: "out.csv".into(),
            extensions: vec!["mp4".to_string(), ".mov".to_string()],
            all_extensions: false,
            workers: 5,
            skip_pdf_pass: false,
            session: crate::config::SessionArgs {
                cookies: "cookies.json".into(),
                user_agent: "ua".into(),
                referer: None,
            },
        };
        assert_eq!(resolve_extensions(&args).unwrap(), vec![".mp4", ".mov"]);
    }
}
