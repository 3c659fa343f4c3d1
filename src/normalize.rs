//! Per-source mapping into the canonical `ViolationRecord`.
//!
//! Both mappers are total except for explicit failures (unparsable date,
//! bad coordinates, unknown NMED outcome). A failure is returned as an error
//! for the caller to log and drop; it never aborts a batch.
//! Scoring happens here, before the record is finalized.

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ingest::types::{ProvisionalRecord, RawNmedRecord, RawNmedViolation};
use crate::model::{
    record_links, Establishment, GeoLocation, Inspection, InspectionType, Outcome, Score, Source,
    Violation, ViolationRecord,
};
use crate::parse::{DEFAULT_CITY, DEFAULT_COUNTY};
use crate::scoring::SeverityScorer;

pub const NMED_SOURCE_URL: &str = "https://www.env.nm.gov/";
pub const ABQ_SOURCE_URL: &str = "https://www.cabq.gov/environmentalhealth";

const UNKNOWN_NAME: &str = "Unknown";
const DEFAULT_STATUS: &str = "Open";
/// Violation descriptions borrowed as reasons when no rule fired.
const FALLBACK_REASONS: usize = 3;
const SNIPPET_MAX_CHARS: usize = 200;

/// Fixed establishment context for report-derived records: the city does not
/// geocode per address, every record gets the city centre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbqProfile {
    #[serde(default = "default_city")]
    pub city: String,
    #[serde(default = "default_county")]
    pub county: String,
    #[serde(default = "default_lat")]
    pub lat: f64,
    #[serde(default = "default_lng")]
    pub lng: f64,
}

fn default_city() -> String {
    DEFAULT_CITY.to_string()
}
fn default_county() -> String {
    DEFAULT_COUNTY.to_string()
}
fn default_lat() -> f64 {
    35.0844
}
fn default_lng() -> f64 {
    -106.6504
}

impl Default for AbqProfile {
    fn default() -> Self {
        Self {
            city: default_city(),
            county: default_county(),
            lat: default_lat(),
            lng: default_lng(),
        }
    }
}

impl AbqProfile {
    pub fn geo(&self) -> GeoLocation {
        GeoLocation::new(self.lat, self.lng)
    }
}

/// `YYYY-MM-DD` or nothing.
pub fn parse_iso_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid inspection date {s:?}"))
}

/// First `SNIPPET_MAX_CHARS` of the record's JSON, for logs.
pub fn record_snippet(raw: &Value) -> String {
    let s = raw.to_string();
    if s.chars().count() > SNIPPET_MAX_CHARS {
        let mut out: String = s.chars().take(SNIPPET_MAX_CHARS).collect();
        out.push('…');
        out
    } else {
        s
    }
}

/* ----------------------------
NMED (programmatic API)
---------------------------- */

fn pick(primary: &Option<String>, alternate: &Option<String>) -> Option<String> {
    primary.clone().or_else(|| alternate.clone())
}

/// `float(x or 0)`: null, absent, empty and zero are all 0.
fn coerce_coord(v: &Option<Value>, field: &str) -> Result<f64> {
    match v {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| anyhow!("{field} is not a finite number")),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(0.0),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .with_context(|| format!("{field} is not numeric: {s:?}")),
        Some(other) => bail!("{field} has unsupported type: {other}"),
    }
}

/// Strings are trimmed, numbers keep their JSON form, anything else is empty.
fn coerce_text(v: &Option<Value>) -> String {
    match v {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// `true`, non-zero numbers and `"true"`/`"y"`/`"yes"`/`"1"` are critical.
fn coerce_flag(v: &Option<Value>) -> bool {
    match v {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|x| x != 0.0),
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "y" | "yes" | "1"
        ),
        _ => false,
    }
}

impl RawNmedViolation {
    pub fn to_violation(&self) -> Violation {
        Violation {
            code: coerce_text(&self.code),
            critical: coerce_flag(&self.critical),
            desc: coerce_text(&self.description),
        }
    }
}

impl RawNmedRecord {
    /// Decode one untyped API record.
    pub fn from_value(raw: &Value) -> Result<Self> {
        if !raw.is_object() {
            bail!("NMED record is not an object");
        }
        serde_json::from_value(raw.clone()).context("decoding NMED record")
    }

    /// `FACILITY_NAME`, then `name`, then `Unknown`.
    pub fn establishment_name(&self) -> String {
        pick(&self.facility_name, &self.name).unwrap_or_else(|| UNKNOWN_NAME.into())
    }

    pub fn establishment(&self) -> Result<Establishment> {
        Ok(Establishment {
            name: self.establishment_name(),
            address: pick(&self.address_primary, &self.address).unwrap_or_default(),
            city: pick(&self.city_primary, &self.city).unwrap_or_default(),
            county: pick(&self.county_primary, &self.county).unwrap_or_default(),
            geo: GeoLocation::new(
                coerce_coord(&self.latitude, "LATITUDE")?,
                coerce_coord(&self.longitude, "LONGITUDE")?,
            ),
        })
    }

    pub fn inspection(&self) -> Result<Inspection> {
        let date_raw = pick(&self.inspection_date, &self.date).unwrap_or_default();
        let date = parse_iso_date(&date_raw)?;

        let kind_raw = self.inspection_type.as_deref().unwrap_or("routine");
        let kind = kind_raw.parse::<InspectionType>().unwrap_or_else(|e| {
            tracing::debug!(target: "ingest", error = %e, "defaulting inspection type to routine");
            InspectionType::Routine
        });

        let outcome = self
            .outcome
            .as_deref()
            .unwrap_or("approved")
            .parse::<Outcome>()?;

        let violations = self
            .violations
            .iter()
            .flatten()
            .map(RawNmedViolation::to_violation)
            .collect();

        Ok(Inspection {
            date,
            kind,
            outcome,
            violations,
        })
    }
}

/// `nm:<city, no spaces, lowercase>:<name, lowercase, spaces→dashes>:<date>`
pub fn nmed_record_id(establishment: &Establishment, date: NaiveDate) -> String {
    format!(
        "nm:{}:{}:{}",
        establishment.city.to_lowercase().replace(' ', ""),
        establishment.name.to_lowercase().replace(' ', "-"),
        date.format("%Y-%m-%d")
    )
}

/// Map without scoring. The record carries an empty score until
/// `score_record` runs.
pub fn map_nmed(raw: &RawNmedRecord) -> Result<ViolationRecord> {
    let establishment = raw.establishment()?;
    let inspection = raw.inspection()?;

    Ok(ViolationRecord {
        id: nmed_record_id(&establishment, inspection.date),
        source: Source::Nmed,
        establishment,
        inspection,
        score: Score::default(),
        links: record_links(NMED_SOURCE_URL, raw.document_url.clone()),
        operational_status: None,
    })
}

pub fn normalize_nmed(
    raw: &RawNmedRecord,
    scorer: &SeverityScorer,
    history: Option<&[Inspection]>,
) -> Result<ViolationRecord> {
    let mut rec = map_nmed(raw)?;
    score_record(&mut rec, scorer, history);
    Ok(rec)
}

/* ----------------------------
ABQ (report-derived)
---------------------------- */

impl ProvisionalRecord {
    pub fn inspection(&self) -> Result<Inspection> {
        Ok(Inspection {
            date: parse_iso_date(&self.date)?,
            kind: InspectionType::Routine,
            outcome: Outcome::from_report_label(&self.outcome),
            violations: self.violations.iter().map(|v| v.to_violation()).collect(),
        })
    }
}

/// `abq:<name, lowercase, spaces→dashes>:<date>`
pub fn abq_record_id(name: &str, date: NaiveDate) -> String {
    format!(
        "abq:{}:{}",
        name.to_lowercase().replace(' ', "-"),
        date.format("%Y-%m-%d")
    )
}

pub fn map_abq(raw: &ProvisionalRecord, profile: &AbqProfile) -> Result<ViolationRecord> {
    if raw.name.trim().is_empty() {
        bail!("report record has no establishment name");
    }

    let establishment = Establishment {
        name: raw.name.clone(),
        address: raw.address.clone(),
        city: profile.city.clone(),
        county: profile.county.clone(),
        geo: profile.geo(),
    };
    let inspection = raw.inspection()?;

    Ok(ViolationRecord {
        id: abq_record_id(&establishment.name, inspection.date),
        source: Source::Abq,
        establishment,
        inspection,
        score: Score::default(),
        links: record_links(ABQ_SOURCE_URL, raw.pdf_url.clone()),
        operational_status: Some(
            raw.operational_status
                .clone()
                .unwrap_or_else(|| DEFAULT_STATUS.to_string()),
        ),
    })
}

pub fn normalize_abq(
    raw: &ProvisionalRecord,
    profile: &AbqProfile,
    scorer: &SeverityScorer,
    history: Option<&[Inspection]>,
) -> Result<ViolationRecord> {
    let mut rec = map_abq(raw, profile)?;
    score_record(&mut rec, scorer, history);
    Ok(rec)
}

/// Score a mapped record in place. Report records with no fired rule borrow
/// their first violation descriptions as reasons.
pub fn score_record(
    rec: &mut ViolationRecord,
    scorer: &SeverityScorer,
    history: Option<&[Inspection]>,
) {
    let mut score = scorer.score(&rec.inspection, history);
    if rec.source == Source::Abq && score.reasons.is_empty() {
        score.reasons = rec
            .inspection
            .violations
            .iter()
            .take(FALLBACK_REASONS)
            .map(|v| v.desc.clone())
            .collect();
    }
    rec.score = score;
}
