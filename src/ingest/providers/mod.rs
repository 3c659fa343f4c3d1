// src/ingest/providers/mod.rs
pub mod abq_pages;
pub mod abq_raw;
pub mod nmed_json;

pub use abq_pages::AbqPagesProvider;
pub use abq_raw::AbqRawProvider;
pub use nmed_json::NmedJsonProvider;
