//! Data models for the ingestion pipeline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One element of the daily listing, as received from the source API.
///
/// The nested `paper` object is kept loosely typed on purpose: a single
/// entry with a missing or mis-shaped field must surface as a per-entry
/// normalization error, not fail the decode of the whole listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEntry {
    #[serde(default)]
    pub paper: serde_json::Value,
}

/// Result of one document download.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    Success(PathBuf),
    Failure(String),
}

impl DownloadOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            DownloadOutcome::Success(p) => Some(p),
            DownloadOutcome::Failure(_) => None,
        }
    }
}

/// Aggregate result of a download fan-out: exactly one outcome per
/// requested paper id, however each individual transfer went.
#[derive(Debug, Default)]
pub struct BatchDownload {
    pub outcomes: HashMap<String, DownloadOutcome>,
}

impl BatchDownload {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn ok_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, DownloadOutcome::Success(_)))
            .count()
    }

    pub fn path_for(&self, paper_id: &str) -> Option<&Path> {
        self.outcomes.get(paper_id).and_then(|o| o.path())
    }
}

/// Expand the document URL template for a paper id. The normalizer and
/// the fetcher both resolve URLs through here, so they cannot diverge.
pub fn document_url(template: &str, paper_id: &str) -> String {
    template.replace("{id}", paper_id)
}

/// Filesystem-safe transform of a paper id for scratch-file naming.
pub fn sanitize_paper_id(paper_id: &str) -> String {
    paper_id.replace(['/', '\\'], "_")
}
