// src/ingest/providers/nmed_json.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;

use crate::ingest::types::{SourceBatch, SourceProvider};

/// Response shapes the NMED endpoints hand out.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NmedPayload {
    Records(Vec<Value>),
    ArcGis { features: Vec<ArcGisFeature> },
    Apigee { inspections: Vec<Value> },
}

#[derive(Debug, Deserialize)]
struct ArcGisFeature {
    attributes: Value,
}

pub struct NmedJsonProvider {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    File(PathBuf),
}

impl NmedJsonProvider {
    pub fn from_fixture_str(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            mode: Mode::File(path.into()),
        }
    }

    /// Individual records stay untyped; they are decoded one by one downstream.
    pub fn parse_records_from_str(s: &str) -> Result<Vec<Value>> {
        let t0 = std::time::Instant::now();
        let payload: NmedPayload =
            serde_json::from_str(s).context("unexpected NMED response format")?;

        let out = match payload {
            NmedPayload::Records(v) => v,
            NmedPayload::ArcGis { features } => features.into_iter().map(|f| f.attributes).collect(),
            NmedPayload::Apigee { inspections } => inspections,
        };

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_nmed_raw_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for NmedJsonProvider {
    async fn fetch_latest(&self) -> Result<SourceBatch> {
        let body = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::File(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading NMED records from {}", path.display()))?,
        };
        Ok(SourceBatch::Nmed(Self::parse_records_from_str(&body)?))
    }

    fn name(&self) -> &'static str {
        "NMED"
    }
}
