//! Output side: latest dataset, monthly snapshot, manifest, and the
//! post-write schema check.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::ingest::providers::abq_raw::RAW_FILE_PREFIX;
use crate::ingest::types::ProvisionalRecord;
use crate::manifest::Manifest;
use crate::model::ViolationRecord;

pub const LATEST_FILE: &str = "violations_latest.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const SNAPSHOT_DIR: &str = "snapshots";

/// Top-level keys every published record must carry.
pub const REQUIRED_FIELDS: [&str; 6] = [
    "id",
    "source",
    "establishment",
    "inspection",
    "score",
    "links",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenPaths {
    pub latest: PathBuf,
    pub snapshot: Option<PathBuf>,
    pub manifest: PathBuf,
}

/// `violations_YYYY-MM.json` for the month of `at`.
pub fn snapshot_file_name(at: DateTime<Utc>) -> String {
    format!("violations_{}.json", at.format("%Y-%m"))
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .with_context(|| format!("serializing {}", path.display()))?;
    fs::write(path, bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))
}

/// Write the dataset files under `dir`, creating directories as needed.
pub async fn write_dataset(
    dir: &Path,
    records: &[ViolationRecord],
    manifest: &Manifest,
    write_snapshot: bool,
    at: DateTime<Utc>,
) -> Result<WrittenPaths> {
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating output dir {}", dir.display()))?;

    let latest = dir.join(LATEST_FILE);
    write_json(&latest, records).await?;

    let snapshot = if write_snapshot {
        let snap_dir = dir.join(SNAPSHOT_DIR);
        fs::create_dir_all(&snap_dir)
            .await
            .with_context(|| format!("creating snapshot dir {}", snap_dir.display()))?;
        let p = snap_dir.join(snapshot_file_name(at));
        write_json(&p, records).await?;
        Some(p)
    } else {
        None
    };

    let manifest_path = dir.join(MANIFEST_FILE);
    write_json(&manifest_path, manifest).await?;

    tracing::info!(
        target: "ingest",
        records = records.len(),
        path = %latest.display(),
        "dataset written"
    );

    Ok(WrittenPaths {
        latest,
        snapshot,
        manifest: manifest_path,
    })
}

/// `abq_YYYY_WW.json` for the ISO week of `at`.
pub fn raw_file_name(at: DateTime<Utc>) -> String {
    let week = at.iso_week();
    format!("{RAW_FILE_PREFIX}{}_{:02}.json", week.year(), week.week())
}

/// Save the run's merged report records so later runs can re-read them.
/// A second run in the same week overwrites that week's file.
pub async fn write_raw_abq(
    dir: &Path,
    records: &[ProvisionalRecord],
    at: DateTime<Utc>,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating raw dir {}", dir.display()))?;
    let path = dir.join(raw_file_name(at));
    write_json(&path, records).await?;
    tracing::info!(target: "ingest", records = records.len(), path = %path.display(), "saved raw report records");
    Ok(path)
}

/// Check that every record is an object carrying the required keys.
pub fn validate_records(values: &[Value]) -> Result<()> {
    for (i, v) in values.iter().enumerate() {
        let Some(obj) = v.as_object() else {
            bail!("record {i} is not an object");
        };
        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|k| !obj.contains_key(*k))
            .collect();
        if !missing.is_empty() {
            let id = obj.get("id").and_then(Value::as_str).unwrap_or("?");
            bail!("record {i} ({id}) is missing {}", missing.join(", "));
        }
    }
    Ok(())
}

/// Re-read a written dataset file and validate it. Returns the record count.
pub async fn validate_file(path: &Path) -> Result<usize> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let values: Vec<Value> = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not a JSON array", path.display()))?;
    validate_records(&values)?;
    Ok(values.len())
}
