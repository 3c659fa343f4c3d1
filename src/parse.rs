//! Report text parser: turns per-page text of a city inspection report into
//! provisional records.
//!
//! Two passes per document:
//! 1. Summary lines. `NAME - ADDRESS` lines set the current establishment,
//!    `Operational Status` lines set its status, and lines starting with
//!    `M/D/YYYY` emit one inspection for the current establishment.
//! 2. Detail pages. Every `Violation:` line on a page becomes one violation
//!    description, attached to the first summary record (in document order)
//!    whose name occurs anywhere on that page. Pages that mention several
//!    establishments are not disambiguated.

use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::ingest::types::{ProvisionalRecord, RawViolation};

pub const DEFAULT_CITY: &str = "Albuquerque";
pub const DEFAULT_COUNTY: &str = "Bernalillo";

const ESTABLISHMENT_SEPARATOR: &str = " - ";
/// Lines containing any of these are headers/labels, never establishments.
const BANNED_TOKENS: [&str; 4] = ["Inspection", "Food", "Permit", "Operational"];
const STATUS_MARKER: &str = "Operational Status";
const VIOLATION_MARKER: &str = "Violation:";

const STATUS_OPEN: &str = "Open";
const STATUS_CLOSED: &str = "Closed";

/// Identity of a provisional record inside one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub name: String,
    pub date: String,
    pub outcome: String,
}

impl RecordKey {
    pub fn of(rec: &ProvisionalRecord) -> Self {
        Self {
            name: rec.name.clone(),
            date: rec.date.clone(),
            outcome: rec.outcome.clone(),
        }
    }
}

/// Records of one document keyed by `(name, date, outcome)`, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    records: Vec<ProvisionalRecord>,
    index: HashMap<RecordKey, usize>,
}

impl ParsedDocument {
    pub fn records(&self) -> &[ProvisionalRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ProvisionalRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A repeat key from a later page overwrites the earlier record only when
    /// it carries an adverse label; the position stays where it first appeared.
    fn absorb(&mut self, rec: ProvisionalRecord) {
        let key = RecordKey::of(&rec);
        match self.index.get(&key) {
            Some(&i) => {
                if rec.outcome != "approved" {
                    self.records[i] = rec;
                }
            }
            None => {
                self.index.insert(key, self.records.len());
                self.records.push(rec);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportParser {
    city: String,
    county: String,
}

impl Default for ReportParser {
    fn default() -> Self {
        Self::new(DEFAULT_CITY, DEFAULT_COUNTY)
    }
}

impl ReportParser {
    pub fn new(city: impl Into<String>, county: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            county: county.into(),
        }
    }

    /// Parse a whole document. Pages are consumed once; only pages carrying
    /// violation details are held back for the second pass.
    pub fn parse_document<I, S>(&self, pages: I, pdf_url: Option<&str>) -> ParsedDocument
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut doc = ParsedDocument::default();
        let mut detail_pages: Vec<String> = Vec::new();

        for page in pages {
            let text = clean_page_text(page.as_ref());
            for mut rec in self.parse_summary_page(&text) {
                rec.pdf_url = pdf_url.map(str::to_string);
                doc.absorb(rec);
            }
            if text.contains(VIOLATION_MARKER) {
                detail_pages.push(text);
            }
        }

        for text in &detail_pages {
            let violations = extract_violations(text);
            if let Some(rec) = doc.records.iter_mut().find(|r| text.contains(r.name.as_str())) {
                rec.violations
                    .extend(violations.into_iter().map(RawViolation::Text));
            } else {
                tracing::trace!(
                    target: "ingest",
                    count = violations.len(),
                    "violation page matched no establishment"
                );
            }
        }

        doc
    }

    /// Pass 1 over a single (already cleaned) page. Exact repeats of
    /// `(name, date, outcome)` on the same page keep the first occurrence.
    pub fn parse_summary_page(&self, text: &str) -> Vec<ProvisionalRecord> {
        let mut out: Vec<ProvisionalRecord> = Vec::new();
        let mut seen: HashSet<RecordKey> = HashSet::new();

        let mut current: Option<(String, String)> = None;
        let mut status = STATUS_OPEN;

        for raw in text.lines() {
            let line = clean_line(raw);

            if let Some((name, address)) = establishment_line(&line) {
                current = (!name.is_empty()).then(|| (name, address));
                status = STATUS_OPEN;
            } else if line.contains(STATUS_MARKER) {
                status = if line.contains(STATUS_CLOSED) {
                    STATUS_CLOSED
                } else {
                    STATUS_OPEN
                };
            } else if starts_with_date(&line) {
                let Some((name, address)) = current.as_ref() else {
                    continue;
                };
                let token = line.split_whitespace().next().unwrap_or_default();
                let Some(date) = parse_us_date(token) else {
                    tracing::trace!(target: "ingest", %token, "skipping unparsable date");
                    continue;
                };

                let rec = ProvisionalRecord {
                    name: name.clone(),
                    address: address.clone(),
                    date: date.format("%Y-%m-%d").to_string(),
                    outcome: outcome_label(&line).to_string(),
                    operational_status: Some(status.to_string()),
                    city: self.city.clone(),
                    county: self.county.clone(),
                    violations: Vec::new(),
                    pdf_url: None,
                };
                if seen.insert(RecordKey::of(&rec)) {
                    out.push(rec);
                }
            }
        }

        out
    }
}

/// Every `Violation:` line with the marker stripped.
pub fn extract_violations(text: &str) -> Vec<String> {
    text.lines()
        .map(clean_line)
        .filter_map(|l| {
            l.strip_prefix(VIOLATION_MARKER)
                .map(|rest| rest.trim().to_string())
        })
        .collect()
}

/// Outcome label from substring tests, first match wins.
pub fn outcome_label(line: &str) -> &'static str {
    if line.contains("Closure") || line.contains("Closed") {
        "closed"
    } else if line.contains("Conditional") {
        "conditional"
    } else if line.contains("Unsatisfactory") || line.contains("Re-Inspection") {
        "failed"
    } else {
        "approved"
    }
}

fn establishment_line(line: &str) -> Option<(String, String)> {
    if BANNED_TOKENS.iter().any(|t| line.contains(t)) {
        return None;
    }
    let (name, address) = line.split_once(ESTABLISHMENT_SEPARATOR)?;
    Some((name.trim().to_string(), address.trim().to_string()))
}

fn starts_with_date(line: &str) -> bool {
    static RE_DATE_PREFIX: OnceCell<Regex> = OnceCell::new();
    let re = RE_DATE_PREFIX
        .get_or_init(|| Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}").expect("date prefix regex"));
    re.is_match(line)
}

/// `M/D/YYYY` (one or two digit month/day). The whole token must match.
pub fn parse_us_date(token: &str) -> Option<NaiveDate> {
    static RE_DATE: OnceCell<Regex> = OnceCell::new();
    let re = RE_DATE.get_or_init(|| {
        Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").expect("date token regex")
    });
    let caps = re.captures(token)?;
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Collapse whitespace noise from text extraction: NBSP and tabs become
/// spaces (both are Unicode whitespace), runs fold to one, ends are trimmed.
pub fn clean_line(line: &str) -> String {
    line.split(char::is_whitespace)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `clean_line` applied to every line, line structure preserved.
pub fn clean_page_text(text: &str) -> String {
    text.lines().map(clean_line).collect::<Vec<_>>().join("\n")
}
