//! Dataset builder binary entrypoint.
//! Loads config, runs the pipeline once over the configured inputs, and
//! writes the dataset files plus manifest.

use anyhow::{Context, Result};
use chrono::Utc;

use nm_inspections::dataset::{validate_file, write_dataset, write_raw_abq};
use nm_inspections::ingest::config::load_config_default;
use nm_inspections::ingest::providers::{AbqPagesProvider, AbqRawProvider, NmedJsonProvider};
use nm_inspections::ingest::types::SourceProvider;
use nm_inspections::telemetry::{init_tracing, Metrics};
use nm_inspections::{run_once, summarize};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = load_config_default()
        .context("loading pipeline config")?
        .apply_env_overrides();

    let metrics = match Metrics::install() {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = ?e, "metrics recorder unavailable");
            None
        }
    };

    let mut providers: Vec<Box<dyn SourceProvider + Send + Sync>> = Vec::new();
    if let Some(p) = &cfg.nmed_input {
        providers.push(Box::new(NmedJsonProvider::from_path(p)));
    }
    if let Some(p) = &cfg.abq_input {
        providers.push(Box::new(AbqPagesProvider::from_dir(p)));
    }
    if let Some(p) = &cfg.abq_raw_input {
        providers.push(Box::new(AbqRawProvider::from_dir(p)));
    }
    if providers.is_empty() {
        tracing::warn!("no inputs configured (set NMED_INPUT, ABQ_INPUT or ABQ_RAW_INPUT); writing an empty dataset");
    }

    let now = Utc::now();
    let out = run_once(&providers, &cfg, now).await;
    tracing::info!(target: "ingest", stats = ?out.stats, "pipeline finished");

    let manifest = summarize(&out.records, now, &cfg.latest_url)?;
    let paths = write_dataset(&cfg.output_dir, &out.records, &manifest, cfg.write_snapshot, now)
        .await
        .context("writing dataset")?;
    tracing::info!(
        version = %manifest.dataset_version,
        high = manifest.severity_breakdown.high,
        medium = manifest.severity_breakdown.medium,
        low = manifest.severity_breakdown.low,
        "manifest written"
    );

    if let Some(dir) = &cfg.raw_output_dir {
        if out.abq_raw.is_empty() {
            tracing::info!("no report records this run; raw file not written");
        } else {
            write_raw_abq(dir, &out.abq_raw, now)
                .await
                .context("saving raw report records")?;
        }
    }

    if cfg.validate {
        let n = validate_file(&paths.latest)
            .await
            .context("validating written dataset")?;
        tracing::info!(records = n, "dataset validated");
    }

    if let (Some(m), Some(path)) = (&metrics, &cfg.metrics_path) {
        m.write_textfile(path).await?;
    }

    Ok(())
}
