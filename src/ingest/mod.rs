// src/ingest/mod.rs
pub mod config;
pub mod providers;
pub mod types;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::Value;

use crate::dedup::merge_documents;
use crate::history::HistoryIndex;
use crate::ingest::config::PipelineConfig;
use crate::ingest::types::{AbqDocument, ProvisionalRecord, RawNmedRecord, SourceBatch, SourceProvider};
use crate::model::{Source, ViolationRecord};
use crate::normalize::{map_abq, map_nmed, record_snippet, score_record};
use crate::parse::ReportParser;
use crate::scoring::SeverityScorer;

/// One-time metrics registration (so series show up in the exposition).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_pages_total", "Report pages read from providers.");
        describe_counter!("ingest_nmed_raw_total", "Raw NMED records read from providers.");
        describe_counter!(
            "ingest_abq_saved_total",
            "Previously saved raw report records read from providers."
        );
        describe_counter!(
            "ingest_provisional_total",
            "Provisional records parsed from report text."
        );
        describe_counter!(
            "ingest_clean_dropped_total",
            "Provisional records of establishments with only approved inspections."
        );
        describe_counter!(
            "ingest_dedup_total",
            "Provisional records folded into a richer duplicate."
        );
        describe_counter!(
            "normalize_records_total",
            "Canonical records produced."
        );
        describe_counter!(
            "normalize_dropped_total",
            "Raw records dropped by mapping failures."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetch/parse errors."
        );
        describe_histogram!("ingest_parse_ms", "Provider parse time in milliseconds.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when ingest pipeline last ran."
        );
    });
}

/// Per-run counts, logged by the binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub provider_errors: usize,
    pub nmed_raw: usize,
    pub abq_documents: usize,
    pub abq_pages: usize,
    pub abq_saved: usize,
    pub abq_provisional: usize,
    pub abq_clean_dropped: usize,
    pub abq_collapsed: usize,
    pub dropped: usize,
    pub records: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    pub records: Vec<ViolationRecord>,
    /// Merged report records of this run, in the shape saved raw files use.
    pub abq_raw: Vec<ProvisionalRecord>,
    pub stats: PipelineStats,
}

fn log_drop(source: Source, err: &anyhow::Error, snippet: &str, stats: &mut PipelineStats) {
    tracing::warn!(target: "ingest", source = source.as_str(), error = %format!("{err:#}"), "dropping record");
    tracing::debug!(target: "ingest", source = source.as_str(), raw = %snippet, "dropped record");
    stats.dropped += 1;
}

/// Score mapped records. History holds only records that survived mapping,
/// grouped by source and establishment identity.
fn score_mapped(records: &mut [ViolationRecord], scorer: &SeverityScorer, score_history: bool) {
    let mut history = HistoryIndex::new();
    if score_history {
        for r in records.iter() {
            history.push(r.source, &r.establishment.name, r.inspection.clone());
        }
    }
    for r in records.iter_mut() {
        let hist = history.get(r.source, &r.establishment.name);
        score_record(r, scorer, hist);
    }
}

/// NMED records → canonical records. Each record is decoded and mapped on
/// its own; failures are logged and dropped.
pub fn normalize_nmed_batch(
    raw: &[Value],
    scorer: &SeverityScorer,
    score_history: bool,
    stats: &mut PipelineStats,
) -> Vec<ViolationRecord> {
    stats.nmed_raw += raw.len();

    let mut out = Vec::with_capacity(raw.len());
    for v in raw {
        match RawNmedRecord::from_value(v).and_then(|r| map_nmed(&r)) {
            Ok(rec) => out.push(rec),
            Err(e) => log_drop(Source::Nmed, &e, &record_snippet(v), stats),
        }
    }
    score_mapped(&mut out, scorer, score_history);
    out
}

/// Parse report documents and merge them with previously saved raw records.
/// Saved records go first, so an equally rich fresh copy does not replace them.
pub fn merge_abq_sources(
    docs: &[AbqDocument],
    saved: Vec<ProvisionalRecord>,
    cfg: &PipelineConfig,
    stats: &mut PipelineStats,
) -> Vec<ProvisionalRecord> {
    let parser = ReportParser::new(cfg.abq.city.clone(), cfg.abq.county.clone());

    stats.abq_saved += saved.len();
    let mut sources: Vec<Vec<ProvisionalRecord>> = Vec::with_capacity(docs.len() + 1);
    sources.push(saved);
    for d in docs {
        let recs = parser
            .parse_document(d.pages.iter(), d.url.as_deref())
            .into_records();
        stats.abq_documents += 1;
        stats.abq_pages += d.pages.len();
        stats.abq_provisional += recs.len();
        sources.push(recs);
    }

    let (merged, clean, collapsed) = merge_documents(sources);
    stats.abq_clean_dropped += clean;
    stats.abq_collapsed += collapsed;
    merged
}

/// Provisional (or previously saved raw ABQ) records → canonical records.
pub fn normalize_provisional(
    records: &[ProvisionalRecord],
    cfg: &PipelineConfig,
    scorer: &SeverityScorer,
    stats: &mut PipelineStats,
) -> Vec<ViolationRecord> {
    let mut out = Vec::with_capacity(records.len());
    for r in records {
        match map_abq(r, &cfg.abq) {
            Ok(rec) => out.push(rec),
            Err(e) => {
                let snippet = serde_json::to_value(r)
                    .map(|v| record_snippet(&v))
                    .unwrap_or_default();
                log_drop(Source::Abq, &e, &snippet, stats);
            }
        }
    }
    score_mapped(&mut out, scorer, cfg.score_history);
    out
}

/// Pure core: batches in, canonical set out. NMED records come first, then
/// report records, each in input order.
pub fn process_batches(
    batches: Vec<SourceBatch>,
    cfg: &PipelineConfig,
    scorer: &SeverityScorer,
) -> PipelineOutput {
    let mut stats = PipelineStats::default();
    let mut nmed_raw: Vec<Value> = Vec::new();
    let mut abq_docs: Vec<AbqDocument> = Vec::new();
    let mut abq_saved: Vec<ProvisionalRecord> = Vec::new();
    for b in batches {
        match b {
            SourceBatch::Nmed(mut v) => nmed_raw.append(&mut v),
            SourceBatch::Abq(mut v) => abq_docs.append(&mut v),
            SourceBatch::AbqRaw(mut v) => abq_saved.append(&mut v),
        }
    }

    let mut records = normalize_nmed_batch(&nmed_raw, scorer, cfg.score_history, &mut stats);
    let abq_raw = merge_abq_sources(&abq_docs, abq_saved, cfg, &mut stats);
    records.extend(normalize_provisional(&abq_raw, cfg, scorer, &mut stats));
    stats.records = records.len();

    PipelineOutput {
        records,
        abq_raw,
        stats,
    }
}

/// Run the pipeline once over the given providers. A failing provider is
/// logged and contributes nothing; the run itself never fails.
pub async fn run_once(
    providers: &[Box<dyn SourceProvider + Send + Sync>],
    cfg: &PipelineConfig,
    now: DateTime<Utc>,
) -> PipelineOutput {
    ensure_metrics_described();

    let mut batches = Vec::new();
    let mut provider_errors = 0usize;
    for p in providers {
        match p.fetch_latest().await {
            Ok(b) => {
                tracing::info!(target: "ingest", provider = p.name(), items = b.len(), "provider batch");
                batches.push(b);
            }
            Err(e) => {
                tracing::warn!(error = ?e, provider = p.name(), "provider error");
                counter!("ingest_provider_errors_total").increment(1);
                provider_errors += 1;
            }
        }
    }

    let scorer = SeverityScorer::at(now);
    let mut out = process_batches(batches, cfg, &scorer);
    out.stats.provider_errors = provider_errors;

    // Telemetry
    let s = &out.stats;
    counter!("ingest_provisional_total").increment(s.abq_provisional as u64);
    counter!("ingest_clean_dropped_total").increment(s.abq_clean_dropped as u64);
    counter!("ingest_dedup_total").increment(s.abq_collapsed as u64);
    counter!("normalize_records_total").increment(s.records as u64);
    counter!("normalize_dropped_total").increment(s.dropped as u64);
    gauge!("ingest_pipeline_last_run_ts").set(now.timestamp().max(0) as f64);

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn scorer() -> SeverityScorer {
        SeverityScorer::new(NaiveDate::from_ymd_opt(2025, 6, 15).unwrap())
    }

    #[test]
    fn empty_batches_give_empty_output() {
        let out = process_batches(vec![], &PipelineConfig::default(), &scorer());
        assert!(out.records.is_empty());
        assert_eq!(out.stats, PipelineStats::default());
    }

    #[test]
    fn bad_nmed_records_are_dropped_individually() {
        let raw = vec![
            json!({"name": "Good", "date": "2025-06-01", "OUTCOME": "failed"}),
            json!({"name": "Bad date", "date": "yesterday"}),
            json!("not an object"),
        ];
        let out = process_batches(
            vec![SourceBatch::Nmed(raw)],
            &PipelineConfig::default(),
            &scorer(),
        );
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.stats.nmed_raw, 3);
        assert_eq!(out.stats.dropped, 2);
    }

    #[test]
    fn nmed_history_feeds_repeat_rule() {
        let raw = vec![
            json!({"name": "Repeat", "date": "2025-06-01", "OUTCOME": "failed"}),
            json!({"FACILITY_NAME": "repeat", "date": "2025-03-01", "OUTCOME": "conditional"}),
        ];
        let mut cfg = PipelineConfig::default();
        let out = process_batches(vec![SourceBatch::Nmed(raw.clone())], &cfg, &scorer());
        assert_eq!(out.records[0].score.severity, 2.5);
        assert!(out.records[0]
            .score
            .reasons
            .contains(&"multiple adverse inspections within 365d".to_string()));

        cfg.score_history = false;
        let out = process_batches(vec![SourceBatch::Nmed(raw)], &cfg, &scorer());
        assert_eq!(out.records[0].score.severity, 2.0);
    }

    #[test]
    fn dropped_records_do_not_count_as_history() {
        let raw = vec![
            json!({"name": "Diner", "date": "2025-06-01", "OUTCOME": "failed"}),
            json!({"name": "Diner", "date": "2025-05-01", "OUTCOME": "failed", "LATITUDE": "north"}),
        ];
        let out = process_batches(
            vec![SourceBatch::Nmed(raw)],
            &PipelineConfig::default(),
            &scorer(),
        );
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.stats.dropped, 1);
        assert_eq!(out.records[0].score.severity, 2.0);
        assert_eq!(
            out.records[0].score.reasons,
            vec!["conditional/failed within 180d"]
        );
    }

    #[test]
    fn saved_records_merge_with_fresh_documents() {
        let saved: Vec<ProvisionalRecord> = serde_json::from_value(json!([
            {"name": "Diner", "address": "1 Main St", "date": "2025-05-01",
             "outcome": "conditional", "violations": ["Hand sink blocked"]},
            {"name": "Diner", "address": "1 Main St", "date": "2025-06-01",
             "outcome": "closed", "violations": []}
        ]))
        .unwrap();
        let doc = AbqDocument {
            url: None,
            pages: vec![
                "DINER - 1 Main St\n6/1/2025 Closure\n".to_string(),
                "DINER\nViolation: Roof leak\n".to_string(),
            ],
        };
        let out = process_batches(
            vec![SourceBatch::Abq(vec![doc]), SourceBatch::AbqRaw(saved)],
            &PipelineConfig::default(),
            &scorer(),
        );

        assert_eq!(out.stats.abq_saved, 2);
        assert_eq!(out.stats.abq_provisional, 1);
        assert_eq!(out.stats.abq_collapsed, 1);
        assert_eq!(out.abq_raw.len(), 2);

        let ids: Vec<&str> = out.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["abq:diner:2025-05-01", "abq:diner:2025-06-01"]);
        // the parsed copy carries a violation, so it replaced the saved one
        assert_eq!(out.records[1].inspection.violations[0].desc, "Roof leak");
        assert_eq!(out.records[1].score.severity, 3.5);
    }
}
