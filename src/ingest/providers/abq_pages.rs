// src/ingest/providers/abq_pages.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use std::path::{Path, PathBuf};

use crate::ingest::types::{AbqDocument, SourceBatch, SourceProvider};

/// Page separator emitted by text-extraction tools.
const FORM_FEED: char = '\u{000C}';

/// Report documents as page text. A directory holds one document per file:
/// `*.json` (`{"url": .., "pages": [..]}`) or `*.txt` (pages split by form feed).
pub struct AbqPagesProvider {
    mode: Mode,
}

enum Mode {
    Fixture(Vec<AbqDocument>),
    Dir(PathBuf),
}

impl AbqPagesProvider {
    pub fn from_documents(docs: Vec<AbqDocument>) -> Self {
        Self {
            mode: Mode::Fixture(docs),
        }
    }

    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: Mode::Dir(dir.into()),
        }
    }

    /// `*.txt` body → document.
    pub fn document_from_text(text: &str) -> AbqDocument {
        AbqDocument {
            url: None,
            pages: text.split(FORM_FEED).map(str::to_string).collect(),
        }
    }

    async fn read_dir_sorted(dir: &Path) -> Result<Vec<AbqDocument>> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("listing report documents in {}", dir.display()))?;

        let mut paths = Vec::new();
        while let Some(e) = entries.next_entry().await? {
            paths.push(e.path());
        }
        // file-name order keeps runs reproducible
        paths.sort();

        let mut docs = Vec::with_capacity(paths.len());
        for path in paths {
            let ext = path
                .extension()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_ascii_lowercase();
            if ext != "json" && ext != "txt" {
                continue;
            }
            match read_document(&path, &ext).await {
                Ok(doc) => docs.push(doc),
                Err(e) => {
                    // one unreadable document is an empty document
                    tracing::warn!(error = ?e, path = %path.display(), "skipping report document");
                    counter!("ingest_provider_errors_total").increment(1);
                }
            }
        }
        Ok(docs)
    }
}

async fn read_document(path: &Path, ext: &str) -> Result<AbqDocument> {
    let body = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    if ext == "json" {
        serde_json::from_str(&body).with_context(|| format!("decoding {}", path.display()))
    } else {
        Ok(AbqPagesProvider::document_from_text(&body))
    }
}

#[async_trait]
impl SourceProvider for AbqPagesProvider {
    async fn fetch_latest(&self) -> Result<SourceBatch> {
        let docs = match &self.mode {
            Mode::Fixture(docs) => docs.clone(),
            Mode::Dir(dir) => Self::read_dir_sorted(dir).await?,
        };
        let pages: usize = docs.iter().map(|d| d.pages.len()).sum();
        counter!("ingest_pages_total").increment(pages as u64);
        Ok(SourceBatch::Abq(docs))
    }

    fn name(&self) -> &'static str {
        "ABQ"
    }
}
