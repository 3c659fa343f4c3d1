// src/ingest/providers/abq_raw.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use std::path::{Path, PathBuf};

use crate::ingest::types::{ProvisionalRecord, SourceBatch, SourceProvider};

/// File-name prefix of saved raw report records (`abq_YYYY_WW.json`).
pub const RAW_FILE_PREFIX: &str = "abq_";

/// Report records saved by earlier runs, so the city's history accumulates
/// across runs instead of covering only the latest reports.
pub struct AbqRawProvider {
    mode: Mode,
}

enum Mode {
    Fixture(Vec<ProvisionalRecord>),
    Dir(PathBuf),
}

impl AbqRawProvider {
    pub fn from_records(records: Vec<ProvisionalRecord>) -> Self {
        Self {
            mode: Mode::Fixture(records),
        }
    }

    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: Mode::Dir(dir.into()),
        }
    }

    pub fn parse_records_from_str(s: &str) -> Result<Vec<ProvisionalRecord>> {
        serde_json::from_str(s).context("saved report records are not a JSON array of records")
    }

    async fn read_dir_sorted(dir: &Path) -> Result<Vec<ProvisionalRecord>> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("listing saved report records in {}", dir.display()))?;

        let mut paths = Vec::new();
        while let Some(e) = entries.next_entry().await? {
            let path = e.path();
            let is_raw = path
                .file_name()
                .and_then(|s| s.to_str())
                .is_some_and(|n| n.starts_with(RAW_FILE_PREFIX) && n.ends_with(".json"));
            if is_raw {
                paths.push(path);
            }
        }
        // oldest week first
        paths.sort();

        let mut out = Vec::new();
        for path in paths {
            let parsed = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))
                .and_then(|body| Self::parse_records_from_str(&body));
            match parsed {
                Ok(mut recs) => out.append(&mut recs),
                Err(e) => {
                    tracing::warn!(error = ?e, path = %path.display(), "skipping saved report records");
                    counter!("ingest_provider_errors_total").increment(1);
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for AbqRawProvider {
    async fn fetch_latest(&self) -> Result<SourceBatch> {
        let records = match &self.mode {
            Mode::Fixture(r) => r.clone(),
            Mode::Dir(dir) => Self::read_dir_sorted(dir).await?,
        };
        counter!("ingest_abq_saved_total").increment(records.len() as u64);
        Ok(SourceBatch::AbqRaw(records))
    }

    fn name(&self) -> &'static str {
        "ABQ-saved"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const RECORD: &str = r#"{"name":"Diner","address":"1 Main St","date":"2025-05-01","outcome":"failed","violations":["Hand sink blocked"]}"#;

    #[tokio::test]
    async fn reads_prefixed_files_oldest_first() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("abq_2025_20.json"),
            format!("[{}]", RECORD.replace("Diner", "Later")),
        )
        .unwrap();
        fs::write(tmp.path().join("abq_2025_19.json"), format!("[{RECORD}]")).unwrap();
        fs::write(tmp.path().join("abq_2025_21.json"), "{not a list").unwrap();
        fs::write(tmp.path().join("nmed_2025-05-01.json"), "[]").unwrap();
        fs::write(tmp.path().join("violations_latest.json"), "[]").unwrap();

        let batch = AbqRawProvider::from_dir(tmp.path()).fetch_latest().await.unwrap();
        let SourceBatch::AbqRaw(recs) = batch else {
            panic!("expected saved report records");
        };
        let names: Vec<&str> = recs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Diner", "Later"]);
        assert_eq!(recs[0].city, "");
        assert!(recs[0].operational_status.is_none());
    }

    #[tokio::test]
    async fn missing_directory_is_a_provider_error() {
        let p = AbqRawProvider::from_dir("/definitely/not/here");
        assert!(p.fetch_latest().await.is_err());
    }
}
