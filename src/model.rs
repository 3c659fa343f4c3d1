//! model.rs: Canonical inspection record and its parts.
//!
//! This is the wire contract read by the frontend (`violations_latest.json`):
//! field names and nesting (`establishment.city`, `score.severity`,
//! `links.source` / `links.document`) must stay as they are.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Coordinates of an establishment. Unknown is `(0, 0)`, never null.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    pub lng: f64,
}

impl GeoLocation {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Establishment {
    pub name: String,
    pub address: String,
    pub city: String,
    pub county: String,
    #[serde(default)]
    pub geo: GeoLocation,
}

/// Identity used for grouping and deduplication: lowercase, trimmed,
/// whitespace-collapsed establishment name.
pub fn establishment_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A single cited violation. Free-text sources rarely carry a code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub critical: bool,
    #[serde(default)]
    pub desc: String,
}

impl Violation {
    /// Non-critical, code-less violation from a bare description.
    pub fn described(desc: impl Into<String>) -> Self {
        Self {
            code: String::new(),
            critical: false,
            desc: desc.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InspectionType {
    Routine,
    Complaint,
    Followup,
    Closure,
    Reopen,
}

impl InspectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionType::Routine => "routine",
            InspectionType::Complaint => "complaint",
            InspectionType::Followup => "followup",
            InspectionType::Closure => "closure",
            InspectionType::Reopen => "reopen",
        }
    }
}

impl FromStr for InspectionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "routine" => Ok(InspectionType::Routine),
            "complaint" => Ok(InspectionType::Complaint),
            "followup" | "follow-up" | "follow up" => Ok(InspectionType::Followup),
            "closure" => Ok(InspectionType::Closure),
            "reopen" | "reopening" => Ok(InspectionType::Reopen),
            other => anyhow::bail!("unknown inspection type: {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Approved,
    Conditional,
    Failed,
    Closed,
    Reopened,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Approved => "approved",
            Outcome::Conditional => "conditional",
            Outcome::Failed => "failed",
            Outcome::Closed => "closed",
            Outcome::Reopened => "reopened",
        }
    }

    /// Failed, conditional or closed.
    pub fn is_adverse(&self) -> bool {
        matches!(
            self,
            Outcome::Failed | Outcome::Conditional | Outcome::Closed
        )
    }

    /// Permissive lookup used for PDF-derived labels: anything unrecognised
    /// is treated as approved.
    pub fn from_report_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "pass" | "approved" => Outcome::Approved,
            "fail" | "failed" => Outcome::Failed,
            "conditional" => Outcome::Conditional,
            "closed" => Outcome::Closed,
            _ => Outcome::Approved,
        }
    }
}

impl FromStr for Outcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "approved" | "pass" => Ok(Outcome::Approved),
            "conditional" => Ok(Outcome::Conditional),
            "failed" | "fail" => Ok(Outcome::Failed),
            "closed" => Ok(Outcome::Closed),
            "reopened" => Ok(Outcome::Reopened),
            other => anyhow::bail!("unknown inspection outcome: {other:?}"),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inspection event. `date` serializes as `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inspection {
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: InspectionType,
    pub outcome: Outcome,
    #[serde(default)]
    pub violations: Vec<Violation>,
}

impl Inspection {
    pub fn critical_count(&self) -> usize {
        self.violations.iter().filter(|v| v.critical).count()
    }
}

/// Synthetic risk value plus the reasons that produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub severity: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Source {
    Nmed,
    Abq,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Nmed => "NMED",
            Source::Abq => "ABQ",
        }
    }
}

/// Canonical unit written to the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub id: String,
    pub source: Source,
    pub establishment: Establishment,
    pub inspection: Inspection,
    pub score: Score,
    pub links: BTreeMap<String, Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operational_status: Option<String>,
}

/// `links` map with the fixed `source` entry and an optional `document`.
pub fn record_links(source_url: &str, document: Option<String>) -> BTreeMap<String, Option<String>> {
    let mut links = BTreeMap::new();
    links.insert("source".to_string(), Some(source_url.to_string()));
    links.insert("document".to_string(), document);
    links
}
