//! On-disk snapshot format: growing schema, header ordering, crash safety.

use std::fs;

use media_probe::store::{ResultStore, UrlRecord};
use tempfile::tempdir;

fn record(pairs: &[(&str, &str)]) -> UrlRecord {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn header_is_preferred_prefix_then_lexical_tail() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metadata.csv");

    let mut store = ResultStore::load(&path).unwrap();
    store.merge(record(&[
        ("original_url", "https://x/a.pdf"),
        ("actual_url", "https://x/a.mp4"),
        ("media_type", "video/mp4"),
        ("is_valid", "true"),
        ("validation_method", "5MB_scan"),
        ("file_size_bytes", "5242880"),
        ("format_duration", "30.2"),
        ("stream_0_video_codec_name", "h264"),
    ]));
    store.flush().unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let header = text.lines().next().unwrap();
    assert_eq!(
        header,
        "original_url,actual_url,media_type,is_valid,validation_method,\
         file_size_bytes,format_duration,stream_0_video_codec_name"
    );
}

#[test]
fn schema_grows_as_new_metadata_fields_appear() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metadata.csv");

    let mut store = ResultStore::load(&path).unwrap();
    store.merge(record(&[
        ("actual_url", "https://x/a.mp4"),
        ("is_valid", "true"),
        ("stream_0_video_codec_name", "h264"),
    ]));
    store.flush().unwrap();
    let first_header_len = fs::read_to_string(&path)
        .unwrap()
        .lines()
        .next()
        .unwrap()
        .split(',')
        .count();

    // A new codec shows up with columns nobody has seen before.
    store.merge(record(&[
        ("actual_url", "https://x/b.mkv"),
        ("is_valid", "true"),
        ("stream_0_video_codec_name", "av1"),
        ("stream_1_subtitle_codec_name", "subrip"),
        ("format_tags_encoder", "libmatroska"),
    ]));
    store.flush().unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let header: Vec<&str> = text.lines().next().unwrap().split(',').collect();
    assert!(header.len() > first_header_len);
    assert!(header.contains(&"stream_1_subtitle_codec_name"));
    assert!(header.contains(&"format_tags_encoder"));

    // Earlier records simply leave the new columns empty.
    let reloaded = ResultStore::load(&path).unwrap();
    let a = reloaded.get("https://x/a.mp4").unwrap();
    assert_eq!(a.get("format_tags_encoder"), None);
}

#[test]
fn flush_never_leaves_a_partial_file_behind() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metadata.csv");

    let mut store = ResultStore::load(&path).unwrap();
    store.merge(record(&[("actual_url", "https://x/a.mp4"), ("is_valid", "true")]));
    store.flush().unwrap();

    // The temp file used for the snapshot rewrite must be gone after flush.
    let tmp = path.with_extension("csv.tmp");
    assert!(!tmp.exists());
    assert!(path.exists());

    // And the snapshot is a complete, parseable table.
    let reloaded = ResultStore::load(&path).unwrap();
    assert_eq!(reloaded.len(), 1);
}

#[test]
fn empty_store_does_not_clobber_an_existing_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metadata.csv");

    let mut store = ResultStore::load(&path).unwrap();
    store.merge(record(&[("actual_url", "https://x/a.mp4"), ("is_valid", "true")]));
    store.flush().unwrap();

    let empty = ResultStore::new(path.clone());
    empty.flush().unwrap();

    let reloaded = ResultStore::load(&path).unwrap();
    assert_eq!(reloaded.len(), 1);
}
