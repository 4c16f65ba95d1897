//! Result store: resumable flat-file persistence of per-URL outcomes.
//!
//! Records are open maps rather than fixed structs because the schema grows as
//! new codecs appear (every new metadata leaf becomes a column). Flushes are
//! full-snapshot rewrites through a temp file + rename, so the on-disk CSV is
//! always a complete, consistent snapshot; a crash loses at most the last
//! unflushed batch. Merging is keyed by `actual_url`, last write wins, so
//! re-merging the same outcome is idempotent and interleaving across workers
//! is safe.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use log::info;

/// Columns pinned to the front of the header, in this order. Everything else
/// follows lexically.
pub const PREFERRED_COLUMNS: [&str; 9] = [
    "original_url",
    "actual_url",
    "media_type",
    "size_bytes",
    "is_tiny",
    "is_valid",
    "validation_method",
    "file_size_bytes",
    "error",
];

/// One per-URL outcome: a flat mapping of column name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UrlRecord {
    fields: BTreeMap<String, String>,
}

impl UrlRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Field accessor.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Sets one field.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// Merges `other` into this record, overwriting existing fields.
    pub fn extend(&mut self, other: BTreeMap<String, String>) {
        self.fields.extend(other);
    }

    /// Dedup key: the resolved URL.
    pub fn key(&self) -> Option<&str> {
        self.get("actual_url").filter(|v| !v.is_empty())
    }

    /// Logical view of the string boolean in `is_valid`. CSV round-trips and
    /// older Python-written files store `True`/`False`; both coerce.
    pub fn is_valid(&self) -> bool {
        self.get("is_valid")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// The recorded media type, if any.
    pub fn media_type(&self) -> Option<&str> {
        self.get("media_type")
    }

    /// All fields, for header union at flush time.
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

impl FromIterator<(String, String)> for UrlRecord {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Reads every row of a CSV file into records keyed by column name.
pub fn read_rows(path: &Path) -> Result<Vec<UrlRecord>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read header row of {}", path.display()))?
        .clone();

    let mut rows = Vec::new();
    for row in reader.records() {
        let row = row.with_context(|| format!("failed to parse row in {}", path.display()))?;
        let record: UrlRecord = headers
            .iter()
            .zip(row.iter())
            .filter(|(_, value)| !value.is_empty())
            .map(|(header, value)| (header.to_string(), value.to_string()))
            .collect();
        rows.push(record);
    }
    Ok(rows)
}

/// Reads a plain URL seed list: header row, URL in the first column.
pub fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut urls = Vec::new();
    for row in reader.records() {
        let row = row.with_context(|| format!("failed to parse row in {}", path.display()))?;
        if let Some(url) = row.get(0) {
            let url = url.trim();
            if !url.is_empty() {
                urls.push(url.to_string());
            }
        }
    }
    Ok(urls)
}

/// Append/merge-safe persistence of [`UrlRecord`]s, keyed by `actual_url`.
pub struct ResultStore {
    path: PathBuf,
    records: BTreeMap<String, UrlRecord>,
}

impl ResultStore {
    /// Creates an empty store that will flush to `path`.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            records: BTreeMap::new(),
        }
    }

    /// Loads the store from `path`, or starts empty if the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        let mut records = BTreeMap::new();
        if path.exists() {
            for record in read_rows(path)? {
                if let Some(key) = record.key() {
                    records.insert(key.to_string(), record);
                }
            }
            info!(
                "Loaded {} existing records from {}",
                records.len(),
                path.display()
            );
        }
        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    /// Merges one record; the last write per key wins.
    pub fn merge(&mut self, record: UrlRecord) {
        if let Some(key) = record.key() {
            self.records.insert(key.to_string(), record);
        }
    }

    /// Whether an outcome for `key` exists.
    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Looks up the record for `key`.
    pub fn get(&self, key: &str) -> Option<&UrlRecord> {
        self.records.get(key)
    }

    /// Number of persisted records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates all records.
    pub fn records(&self) -> impl Iterator<Item = &UrlRecord> {
        self.records.values()
    }

    /// Count of records marked valid.
    pub fn valid_count(&self) -> usize {
        self.records.values().filter(|r| r.is_valid()).count()
    }

    /// Count of records not marked valid.
    pub fn invalid_count(&self) -> usize {
        self.len() - self.valid_count()
    }

    /// Rewrites the whole file as one consistent snapshot.
    ///
    /// The header is the union of keys across all records: the preferred
    /// columns first (those that occur), then the rest lexically. Rows leave
    /// absent columns empty. The write goes to a temp file that is renamed
    /// over the target, so a crash mid-flush never corrupts the store.
    pub fn flush(&self) -> Result<()> {
        if self.records.is_empty() {
            return Ok(());
        }

        let header = header_order(self.records.values());
        let tmp_path = self.path.with_extension("csv.tmp");

        let mut writer = WriterBuilder::new()
            .from_path(&tmp_path)
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;
        writer
            .write_record(&header)
            .context("failed to write header row")?;

        for record in self.records.values() {
            let row: Vec<&str> = header
                .iter()
                .map(|column| record.get(column).unwrap_or(""))
                .collect();
            writer.write_record(&row).context("failed to write row")?;
        }
        writer.flush().context("failed to flush CSV writer")?;
        drop(writer);

        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "failed to move snapshot into place at {}",
                self.path.display()
            )
        })?;
        info!(
            "Progress saved: {} records to {}",
            self.records.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Union of all record keys: preferred prefix first, remainder lexical.
fn header_order<'a>(records: impl Iterator<Item = &'a UrlRecord>) -> Vec<String> {
    let mut all_keys = BTreeSet::new();
    for record in records {
        for key in record.fields().keys() {
            all_keys.insert(key.clone());
        }
    }

    let mut header = Vec::with_capacity(all_keys.len());
    for preferred in PREFERRED_COLUMNS {
        if all_keys.remove(preferred) {
            header.push(preferred.to_string());
        }
    }
    header.extend(all_keys);
    header
}
