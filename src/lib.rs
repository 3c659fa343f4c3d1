// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod dataset;
pub mod dedup;
pub mod history;
pub mod ingest;
pub mod manifest;
pub mod model;
pub mod normalize;
pub mod parse;
pub mod scoring;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::ingest::{process_batches, run_once, PipelineOutput, PipelineStats};
pub use crate::manifest::{summarize, Manifest};
pub use crate::model::{Inspection, Outcome, Score, Source, ViolationRecord};
pub use crate::scoring::{SeverityScorer, SeverityTier};
