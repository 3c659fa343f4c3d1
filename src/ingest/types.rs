// src/ingest/types.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::model::Violation;

/// One NMED record as the API hands it out. Primary (upper-case) and
/// alternate (lower-case) keys are kept apart so fallback order is explicit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawNmedRecord {
    #[serde(rename = "FACILITY_NAME", default)]
    pub facility_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,

    #[serde(rename = "ADDRESS", default)]
    pub address_primary: Option<String>,
    #[serde(default)]
    pub address: Option<String>,

    #[serde(rename = "CITY", default)]
    pub city_primary: Option<String>,
    #[serde(default)]
    pub city: Option<String>,

    #[serde(rename = "COUNTY", default)]
    pub county_primary: Option<String>,
    #[serde(default)]
    pub county: Option<String>,

    /// Number, numeric string or null; coerced during mapping.
    #[serde(rename = "LATITUDE", default)]
    pub latitude: Option<serde_json::Value>,
    #[serde(rename = "LONGITUDE", default)]
    pub longitude: Option<serde_json::Value>,

    #[serde(rename = "INSPECTION_DATE", default)]
    pub inspection_date: Option<String>,
    #[serde(default)]
    pub date: Option<String>,

    #[serde(rename = "INSPECTION_TYPE", default)]
    pub inspection_type: Option<String>,
    #[serde(rename = "OUTCOME", default)]
    pub outcome: Option<String>,
    #[serde(rename = "DOCUMENT_URL", default)]
    pub document_url: Option<String>,

    #[serde(default)]
    pub violations: Option<Vec<RawNmedViolation>>,
}

/// Violation sub-object. Fields stay untyped: codes arrive as strings or
/// numbers, the critical flag as bool, 0/1 or `"Y"`/`"true"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawNmedViolation {
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    #[serde(default)]
    pub critical: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<serde_json::Value>,
}

/// A violation as carried on a provisional ABQ record: either the bare
/// description scraped from a detail page, or an already-structured entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RawViolation {
    Text(String),
    Detailed {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        critical: Option<bool>,
        #[serde(default)]
        desc: Option<String>,
    },
}

impl RawViolation {
    pub fn to_violation(&self) -> Violation {
        match self {
            RawViolation::Text(desc) => Violation::described(desc.clone()),
            RawViolation::Detailed {
                code,
                critical,
                desc,
            } => Violation {
                code: code.clone().unwrap_or_default(),
                critical: critical.unwrap_or(false),
                desc: desc.clone().unwrap_or_default(),
            },
        }
    }
}

/// Intermediate ABQ record produced by the page-text parser, not yet validated.
/// Same shape as the raw ABQ JSON the scraper persists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProvisionalRecord {
    pub name: String,
    pub address: String,
    /// `YYYY-MM-DD`; anything else discards the record during normalization.
    pub date: String,
    /// Raw outcome label (`approved`, `pass`, `fail`, ...).
    pub outcome: String,
    #[serde(default)]
    pub operational_status: Option<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub county: String,
    #[serde(default)]
    pub violations: Vec<RawViolation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
}

/// Text of one report document, one string per page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbqDocument {
    #[serde(default)]
    pub url: Option<String>,
    pub pages: Vec<String>,
}

/// What a provider yields for one run.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceBatch {
    /// Raw NMED records, still untyped: each is decoded individually so one
    /// malformed record cannot take down the batch.
    Nmed(Vec<serde_json::Value>),
    Abq(Vec<AbqDocument>),
    /// Report records saved by an earlier run.
    AbqRaw(Vec<ProvisionalRecord>),
}

impl SourceBatch {
    pub fn len(&self) -> usize {
        match self {
            SourceBatch::Nmed(v) => v.len(),
            SourceBatch::Abq(v) => v.len(),
            SourceBatch::AbqRaw(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
pub trait SourceProvider {
    async fn fetch_latest(&self) -> Result<SourceBatch>;
    fn name(&self) -> &'static str;
}
