//! Dataset manifest: version hash, per-city counts and severity breakdown.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::model::ViolationRecord;
use crate::scoring::SeverityTier;

pub const DEFAULT_LATEST_URL: &str = "/data/violations_latest.json";
const VERSION_HEX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityBreakdown {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityBreakdown {
    fn bump(&mut self, tier: SeverityTier) {
        match tier {
            SeverityTier::High => self.high += 1,
            SeverityTier::Medium => self.medium += 1,
            SeverityTier::Low => self.low += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub url: String,
    pub hash: String,
    pub records: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub generated_at: String,
    pub dataset_version: String,
    pub total_records: usize,
    pub cities: BTreeMap<String, usize>,
    pub severity_breakdown: SeverityBreakdown,
    pub datasets: BTreeMap<String, DatasetEntry>,
}

/// Short SHA-256 over the records serialized with sorted object keys, so the
/// tag only moves when content does.
pub fn dataset_version(records: &[ViolationRecord]) -> Result<String> {
    // serde_json::Value keeps object keys in a BTreeMap
    let canonical = serde_json::to_value(records).context("serializing dataset for hashing")?;
    let bytes = serde_json::to_vec(&canonical).context("encoding dataset for hashing")?;

    let digest = Sha256::digest(&bytes);
    let mut out = String::with_capacity(VERSION_HEX_LEN);
    for b in digest.iter().take(VERSION_HEX_LEN / 2) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    Ok(out)
}

pub fn summarize(
    records: &[ViolationRecord],
    generated_at: DateTime<Utc>,
    latest_url: &str,
) -> Result<Manifest> {
    let version = dataset_version(records)?;

    let mut cities: BTreeMap<String, usize> = BTreeMap::new();
    let mut breakdown = SeverityBreakdown::default();
    for r in records {
        *cities.entry(r.establishment.city.clone()).or_insert(0) += 1;
        breakdown.bump(r.score.tier());
    }

    let mut datasets = BTreeMap::new();
    datasets.insert(
        "latest".to_string(),
        DatasetEntry {
            url: latest_url.to_string(),
            hash: version.clone(),
            records: records.len(),
        },
    );

    Ok(Manifest {
        generated_at: generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        dataset_version: version,
        total_records: records.len(),
        cities,
        severity_breakdown: breakdown,
        datasets,
    })
}
