//! Metadata assembly for archive items.
//!
//! The record is built in three layers: fixed fields, fields derived from the
//! staged files and uploader, then user-supplied `key=value` pairs on top.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDate};
use tracing::debug;

use super::schema::{MetadataRecord, MetadataValue};

pub const DEFAULT_SCANNER: &str = "Discord Bot";
pub const DEFAULT_COLLECTION: &str = "opensource_media";

/// Parse `key=value[,key=value...]`.
///
/// Pairs without `=`, or with an empty key or value after trimming, are
/// dropped. Keys are lowercased, as archive field names are. Repeated keys
/// collect into a list in the order given.
pub fn parse_custom_metadata(raw: Option<&str>) -> MetadataRecord {
    let mut record = MetadataRecord::new();
    let Some(raw) = raw else {
        return record;
    };

    for pair in raw.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            continue;
        }
        record.append(key.to_ascii_lowercase(), value);
    }
    record
}

/// Render parsed pairs for the echo message: `` `k=v`, `k=[a, b]` ``.
pub fn describe_custom(record: &MetadataRecord) -> String {
    record
        .iter()
        .map(|(key, value)| format!("`{key}={value}`"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Creation time where the platform has one, otherwise mtime.
async fn file_timestamp(path: &Path) -> Option<SystemTime> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    meta.created().or_else(|_| meta.modified()).ok()
}

fn earliest_date(timestamps: impl IntoIterator<Item = SystemTime>) -> Option<NaiveDate> {
    timestamps
        .into_iter()
        .min()
        .map(|t| DateTime::<Local>::from(t).date_naive())
}

/// Oldest timestamp across `paths`, as a local calendar date.
///
/// Unreadable files are skipped; `None` if nothing could be read. Filesystem
/// times are a heuristic, not provenance.
pub async fn derive_date(paths: &[PathBuf]) -> Option<NaiveDate> {
    let mut timestamps = Vec::with_capacity(paths.len());
    for path in paths {
        match file_timestamp(path).await {
            Some(ts) => timestamps.push(ts),
            None => debug!(path = %path.display(), "no readable timestamp"),
        }
    }
    earliest_date(timestamps)
}

/// Everything the assembler needs from one invocation.
pub struct MetadataInputs<'a> {
    /// Raw attachment filenames, in invocation order.
    pub filenames: &'a [&'a str],
    /// Basenames of the staged files.
    pub staged_names: &'a [String],
    pub uploader: &'a str,
    pub date: Option<NaiveDate>,
    pub custom: MetadataRecord,
}

/// Fixed fields shared by every item.
#[derive(Debug, Clone)]
pub struct MetadataAssembler {
    scanner: String,
    collection: String,
}

impl Default for MetadataAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_SCANNER, DEFAULT_COLLECTION)
    }
}

impl MetadataAssembler {
    pub fn new(scanner: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            scanner: scanner.into(),
            collection: collection.into(),
        }
    }

    pub fn assemble(&self, inputs: MetadataInputs<'_>) -> MetadataRecord {
        let mut record = MetadataRecord::new();
        record.set("scanner", self.scanner.as_str());
        record.set("collection", self.collection.as_str());

        if let Some(date) = inputs.date {
            record.set("date", date.format("%Y-%m-%d").to_string());
        }

        let user = inputs.uploader;
        match inputs.filenames {
            [filename] => {
                record.set("title", *filename);
                record.set(
                    "description",
                    format!("Uploaded via Discord bot by {user}: {filename}"),
                );
            }
            _ => {
                record.set("title", format!("Files uploaded by {user}"));
                record.set(
                    "description",
                    format!(
                        "Uploaded via Discord bot by {user}.\n\nUploaded files:\n{}",
                        inputs.staged_names.join("\n")
                    ),
                );
            }
        }

        record.merge(inputs.custom);
        record
    }
}
