// tests/pipeline_e2e.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::path::PathBuf;

use nm_inspections::dataset::write_raw_abq;
use nm_inspections::ingest::config::PipelineConfig;
use nm_inspections::ingest::providers::{AbqPagesProvider, AbqRawProvider, NmedJsonProvider};
use nm_inspections::ingest::types::{SourceBatch, SourceProvider};
use nm_inspections::manifest::summarize;
use nm_inspections::model::{Outcome, Source};
use nm_inspections::{run_once, PipelineStats};

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
}

fn providers() -> Vec<Box<dyn SourceProvider + Send + Sync>> {
    vec![
        Box::new(NmedJsonProvider::from_path(fixtures().join("nmed_arcgis.json"))),
        Box::new(AbqPagesProvider::from_dir(fixtures().join("abq"))),
    ]
}

struct BrokenProvider;

#[async_trait]
impl SourceProvider for BrokenProvider {
    async fn fetch_latest(&self) -> Result<SourceBatch> {
        Err(anyhow!("upstream unavailable"))
    }
    fn name(&self) -> &'static str {
        "Broken"
    }
}

#[tokio::test]
async fn fixtures_produce_scored_records() {
    let out = run_once(&providers(), &PipelineConfig::default(), now()).await;

    let ids: Vec<&str> = out.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "nm:santafe:green-chile-grill:2025-06-10",
            "abq:burger-barn:2025-05-20",
            "abq:burger-barn:2025-06-01",
        ]
    );

    let grill = &out.records[0];
    assert_eq!(grill.source, Source::Nmed);
    assert!((grill.establishment.geo.lat - 35.6824).abs() < 1e-9);
    assert_eq!(grill.score.severity, 3.0);
    assert_eq!(
        grill.score.reasons,
        vec!["conditional/failed within 180d", "2 critical violation(s)"]
    );
    assert_eq!(
        grill.links["document"].as_deref(),
        Some("https://www.env.nm.gov/reports/gcg-2025-06-10.pdf")
    );
    assert!(grill.operational_status.is_none());

    let failed = &out.records[1];
    assert_eq!(failed.inspection.outcome, Outcome::Failed);
    assert_eq!(failed.inspection.violations.len(), 2);
    assert_eq!(failed.inspection.violations[1].desc, "Cold holding above 41F");
    assert_eq!(failed.operational_status.as_deref(), Some("Open"));
    assert_eq!(failed.score.severity, 2.5);
    assert_eq!(failed.establishment.city, "Albuquerque");
    assert!((failed.establishment.geo.lng + 106.6504).abs() < 1e-9);

    // the richer copy from the second document replaced the first
    let closed = &out.records[2];
    assert_eq!(closed.inspection.outcome, Outcome::Closed);
    assert_eq!(closed.inspection.violations.len(), 1);
    assert_eq!(closed.inspection.violations[0].desc, "Roof leak over prep line");
    assert_eq!(closed.operational_status.as_deref(), Some("Closed"));
    assert_eq!(closed.score.severity, 3.5);
    assert!(closed.links["document"].is_none());

    assert_eq!(
        out.stats,
        PipelineStats {
            provider_errors: 0,
            nmed_raw: 2,
            abq_documents: 2,
            abq_pages: 4,
            abq_saved: 0,
            abq_provisional: 4,
            abq_clean_dropped: 1,
            abq_collapsed: 1,
            dropped: 1,
            records: 3,
        }
    );
}

#[tokio::test]
async fn all_approved_establishments_never_surface() {
    let out = run_once(&providers(), &PipelineConfig::default(), now()).await;
    assert!(out
        .records
        .iter()
        .all(|r| r.establishment.name != "TACO TOWN"));
}

#[tokio::test]
async fn runs_are_idempotent() {
    let cfg = PipelineConfig::default();
    let a = run_once(&providers(), &cfg, now()).await;
    let b = run_once(&providers(), &cfg, now()).await;
    assert_eq!(a.records, b.records);

    let ma = summarize(&a.records, now(), &cfg.latest_url).unwrap();
    let mb = summarize(&b.records, now(), &cfg.latest_url).unwrap();
    assert_eq!(ma.dataset_version, mb.dataset_version);
    assert_eq!(ma.cities.get("Albuquerque"), Some(&2));
    assert_eq!(ma.cities.get("Santa Fe"), Some(&1));
    assert_eq!(ma.severity_breakdown.high, 2);
    assert_eq!(ma.severity_breakdown.medium, 1);
}

#[tokio::test]
async fn failing_providers_contribute_nothing() {
    let providers: Vec<Box<dyn SourceProvider + Send + Sync>> = vec![
        Box::new(BrokenProvider),
        Box::new(NmedJsonProvider::from_path(fixtures().join("missing.json"))),
        Box::new(NmedJsonProvider::from_fixture_str(r#"{"unexpected": true}"#)),
    ];
    let out = run_once(&providers, &PipelineConfig::default(), now()).await;
    assert!(out.records.is_empty());
    assert_eq!(out.stats.provider_errors, 3);
}

#[tokio::test]
async fn history_can_be_disabled() {
    let cfg = PipelineConfig {
        score_history: false,
        ..PipelineConfig::default()
    };
    let out = run_once(&providers(), &cfg, now()).await;
    let closed = out
        .records
        .iter()
        .find(|r| r.id == "abq:burger-barn:2025-06-01")
        .unwrap();
    assert_eq!(closed.score.severity, 3.0);
    assert_eq!(closed.score.reasons, vec!["closure within 180d"]);
}

#[tokio::test]
async fn saved_raw_records_join_the_run() {
    let providers: Vec<Box<dyn SourceProvider + Send + Sync>> = vec![
        Box::new(AbqPagesProvider::from_dir(fixtures().join("abq"))),
        Box::new(AbqRawProvider::from_dir(fixtures().join("abq_raw"))),
    ];
    let out = run_once(&providers, &PipelineConfig::default(), now()).await;

    let ids: Vec<&str> = out.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "abq:burger-barn:2025-03-10",
            "abq:burger-barn:2025-05-20",
            "abq:burger-barn:2025-06-01",
        ]
    );
    assert_eq!(out.stats.abq_saved, 2);
    // Quiet Cafe and Taco Town only ever passed
    assert_eq!(out.stats.abq_clean_dropped, 2);

    let older = &out.records[0];
    assert_eq!(older.score.severity, 2.5);
    assert_eq!(
        older.links["document"].as_deref(),
        Some("https://www.cabq.gov/environmentalhealth/reports/2025-03.pdf")
    );

    // saving and re-reading the merged set reproduces the report records
    let tmp = tempfile::tempdir().unwrap();
    write_raw_abq(tmp.path(), &out.abq_raw, now()).await.unwrap();
    let reread: Vec<Box<dyn SourceProvider + Send + Sync>> =
        vec![Box::new(AbqRawProvider::from_dir(tmp.path()))];
    let again = run_once(&reread, &PipelineConfig::default(), now()).await;
    assert_eq!(again.records, out.records);
}
