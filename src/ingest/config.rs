// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::manifest::DEFAULT_LATEST_URL;
use crate::normalize::AbqProfile;

const ENV_PATH: &str = "INSPECTIONS_CONFIG_PATH";
const ENV_NMED_INPUT: &str = "NMED_INPUT";
const ENV_ABQ_INPUT: &str = "ABQ_INPUT";
const ENV_ABQ_RAW_INPUT: &str = "ABQ_RAW_INPUT";
const ENV_RAW_OUTPUT_DIR: &str = "RAW_OUTPUT_DIR";
const ENV_OUTPUT_DIR: &str = "OUTPUT_DIR";

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_true() -> bool {
    true
}
fn default_latest_url() -> String {
    DEFAULT_LATEST_URL.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Raw NMED JSON (array, ArcGIS or Apigee response).
    #[serde(default)]
    pub nmed_input: Option<PathBuf>,
    /// Directory of report page-text documents.
    #[serde(default)]
    pub abq_input: Option<PathBuf>,
    /// Directory of saved raw report records (`abq_*.json`) from earlier runs.
    #[serde(default)]
    pub abq_raw_input: Option<PathBuf>,
    /// Where this run's merged report records are saved as `abq_YYYY_WW.json`.
    #[serde(default)]
    pub raw_output_dir: Option<PathBuf>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Score each inspection against its establishment's other inspections.
    #[serde(default = "default_true")]
    pub score_history: bool,
    #[serde(default = "default_true")]
    pub write_snapshot: bool,
    /// Re-read and check the written dataset.
    #[serde(default)]
    pub validate: bool,
    /// Prometheus textfile written after the run.
    #[serde(default)]
    pub metrics_path: Option<PathBuf>,
    #[serde(default = "default_latest_url")]
    pub latest_url: String,
    #[serde(default)]
    pub abq: AbqProfile,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            nmed_input: None,
            abq_input: None,
            abq_raw_input: None,
            raw_output_dir: None,
            output_dir: default_output_dir(),
            score_history: true,
            write_snapshot: true,
            validate: false,
            metrics_path: None,
            latest_url: default_latest_url(),
            abq: AbqProfile::default(),
        }
    }
}

impl PipelineConfig {
    /// `NMED_INPUT`, `ABQ_INPUT`, `ABQ_RAW_INPUT`, `RAW_OUTPUT_DIR` and
    /// `OUTPUT_DIR` override file values.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Some(p) = env_path(ENV_NMED_INPUT) {
            self.nmed_input = Some(p);
        }
        if let Some(p) = env_path(ENV_ABQ_INPUT) {
            self.abq_input = Some(p);
        }
        if let Some(p) = env_path(ENV_ABQ_RAW_INPUT) {
            self.abq_raw_input = Some(p);
        }
        if let Some(p) = env_path(ENV_RAW_OUTPUT_DIR) {
            self.raw_output_dir = Some(p);
        }
        if let Some(p) = env_path(ENV_OUTPUT_DIR) {
            self.output_dir = p;
        }
        self
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_config_from(path: &Path) -> Result<PipelineConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading pipeline config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
        .with_context(|| format!("parsing pipeline config {}", path.display()))
}

/// Load config using env var + fallbacks:
/// 1) $INSPECTIONS_CONFIG_PATH
/// 2) config/pipeline.toml
/// 3) config/pipeline.json
/// 4) built-in defaults
pub fn load_config_default() -> Result<PipelineConfig> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        } else {
            return Err(anyhow!("INSPECTIONS_CONFIG_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/pipeline.toml");
    if toml_p.exists() {
        return load_config_from(&toml_p);
    }
    let json_p = PathBuf::from("config/pipeline.json");
    if json_p.exists() {
        return load_config_from(&json_p);
    }
    Ok(PipelineConfig::default())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<PipelineConfig> {
    // JSON objects start with '{'; everything else is a TOML candidate.
    let try_toml = hint_ext == "toml" || (hint_ext != "json" && !s.trim_start().starts_with('{'));
    if try_toml {
        if let Ok(v) = toml::from_str::<PipelineConfig>(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = serde_json::from_str::<PipelineConfig>(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = toml::from_str::<PipelineConfig>(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported pipeline config format"))
}
