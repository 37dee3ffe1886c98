//! Record types persisted by the store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A normalized daily paper. Written once per run per `paper_id`;
/// `explanation` is the only field that ever changes after the first
/// upsert, and only from absent to present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Stable external identifier (e.g. "2502.01234"), primary key.
    pub paper_id: String,
    pub title: String,
    pub authors: Vec<Author>,
    /// Short abstract as provided by the listing source.
    pub summary: String,
    pub published_at: DateTime<Utc>,
    /// Derived deterministically from `paper_id` via the URL template.
    pub document_url: String,
    /// Long-form explanation from the enrichment service. Absent until
    /// enrichment succeeds; a later run may fill it in.
    pub explanation: Option<String>,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Singleton run-tracking record.
///
/// `last_processed_date` is the watermark: it only moves forward, and only
/// when a run completes. `started_at` is the lease timestamp for the
/// `is_processing` flag: a flag older than the configured lease is treated
/// as an abandoned run, not a lock.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub last_processed_date: Option<NaiveDate>,
    pub is_processing: bool,
    pub started_at: Option<DateTime<Utc>>,
}

impl ProcessingMetadata {
    /// Whether a run is active and its lease has not yet expired.
    pub fn has_live_run(&self, now: DateTime<Utc>, stale_after: chrono::Duration) -> bool {
        if !self.is_processing {
            return false;
        }
        match self.started_at {
            Some(started) => now.signed_duration_since(started) < stale_after,
            // Flag set but no lease timestamp: crashed before the model
            // carried one, or corrupt. Safe to retry.
            None => false,
        }
    }
}
