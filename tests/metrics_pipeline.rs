// tests/metrics_pipeline.rs
use chrono::{TimeZone, Utc};
use std::path::PathBuf;

use nm_inspections::ingest::config::PipelineConfig;
use nm_inspections::ingest::providers::{AbqPagesProvider, NmedJsonProvider};
use nm_inspections::ingest::types::SourceProvider;
use nm_inspections::run_once;
use nm_inspections::telemetry::Metrics;

#[tokio::test]
async fn metrics_exposed_after_run() {
    // One recorder per test binary
    let metrics = Metrics::install().expect("recorder");

    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    let providers: Vec<Box<dyn SourceProvider + Send + Sync>> = vec![
        Box::new(NmedJsonProvider::from_path(dir.join("nmed_arcgis.json"))),
        Box::new(AbqPagesProvider::from_dir(dir.join("abq"))),
    ];
    let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
    let out = run_once(&providers, &PipelineConfig::default(), now).await;
    assert_eq!(out.records.len(), 3);

    // Scrape metrics text and check series presence by substring
    let text = metrics.render();
    for name in [
        "ingest_pages_total",
        "ingest_nmed_raw_total",
        "ingest_provisional_total",
        "ingest_clean_dropped_total",
        "ingest_dedup_total",
        "normalize_records_total",
        "normalize_dropped_total",
        "ingest_parse_ms",
        "ingest_pipeline_last_run_ts",
    ] {
        assert!(text.contains(name), "missing {name} in:\n{text}");
    }

    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("textfile/inspections.prom");
    metrics.write_textfile(&path).await.unwrap();
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("normalize_records_total"));
}
