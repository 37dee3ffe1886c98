//! Daily ingest orchestrator.
//!
//! Owns every transition of the processing metadata:
//!   Idle → Running → {Completed, Failed, Skipped}
//!
//! Per-item errors (malformed entry, failed download, failed enrichment)
//! are absorbed here and reported as counts — the run still completes and
//! the watermark advances. A listing failure or an unrecoverable store
//! write (paper upsert or metadata) is fatal; on those the watermark stays
//! where it was so the next check re-attempts the whole day.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use paperflux_common::config::IngestConfig;
use paperflux_common::{Clock, PaperfluxError};
use paperflux_db::{PaperRecord, PaperStore, ProcessingMetadata};

use crate::enrichment::Enricher;
use crate::fetcher::DocumentFetcher;
use crate::normalize::normalize;
use crate::sources::ListingSource;

// ── Dependencies and policy ───────────────────────────────────────────────────

/// Everything the orchestrator touches, as explicit handles.
/// No ambient globals; tests swap any seam for a mock.
pub struct IngestDeps {
    pub source: Arc<dyn ListingSource>,
    pub fetcher: Arc<dyn DocumentFetcher>,
    pub enricher: Arc<dyn Enricher>,
    pub store: Arc<dyn PaperStore>,
    pub clock: Arc<dyn Clock>,
    /// Shared with the normalizer so derived document URLs cannot diverge
    /// from the ones the fetcher resolves.
    pub document_url_template: String,
}

#[derive(Debug, Clone)]
pub struct IngestPolicy {
    pub stale_run_after: ChronoDuration,
    pub metadata_write_attempts: u32,
}

impl IngestPolicy {
    pub fn from_config(cfg: &IngestConfig) -> Self {
        Self {
            stale_run_after: ChronoDuration::minutes(cfg.stale_run_after_mins),
            metadata_write_attempts: cfg.metadata_write_attempts.max(1),
        }
    }
}

impl Default for IngestPolicy {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

// ── Progress events ───────────────────────────────────────────────────────────

/// Progress event emitted during a run (cloneable for broadcast).
#[derive(Debug, Clone, Serialize)]
pub struct IngestProgress {
    pub stage: String,
    pub message: String,
    pub papers_total: usize,
    pub papers_done: usize,
}

// ── Result summary ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    /// Watermark already at today and no run active.
    SkippedAlreadyProcessed,
    /// Another run holds a live (unexpired) lease.
    SkippedInProgress,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub run_date: NaiveDate,
    pub status: RunStatus,
    pub papers_listed: usize,
    pub malformed_skipped: usize,
    pub downloads_ok: usize,
    pub downloads_failed: usize,
    pub enriched: usize,
    pub enrichment_failed: usize,
    pub papers_upserted: usize,
    pub upserts_failed: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl IngestReport {
    fn new(run_date: NaiveDate, status: RunStatus) -> Self {
        Self {
            run_date,
            status,
            papers_listed: 0,
            malformed_skipped: 0,
            downloads_ok: 0,
            downloads_failed: 0,
            enriched: 0,
            enrichment_failed: 0,
            papers_upserted: 0,
            upserts_failed: 0,
            errors: Vec::new(),
            duration_ms: 0,
        }
    }
}

// ── Entry guard ───────────────────────────────────────────────────────────────

/// Decide whether a run may start. `None` means go; `Some(status)` names
/// the skip reason. A stale `is_processing` flag (expired lease, or no
/// lease timestamp at all) never blocks — per-run crashes must not wedge
/// the pipeline forever.
pub fn should_skip(
    meta: &ProcessingMetadata,
    now: chrono::DateTime<chrono::Utc>,
    today: NaiveDate,
    policy: &IngestPolicy,
) -> Option<RunStatus> {
    if meta.has_live_run(now, policy.stale_run_after) {
        return Some(RunStatus::SkippedInProgress);
    }
    if meta.last_processed_date == Some(today) && !meta.is_processing {
        return Some(RunStatus::SkippedAlreadyProcessed);
    }
    None
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// Runs the full daily pipeline once. Always returns a report; a fatal
/// error is a `Failed` report with the cause in `errors`.
#[instrument(skip(deps, policy, progress_tx))]
pub async fn run_daily_ingest(
    deps: &IngestDeps,
    policy: &IngestPolicy,
    progress_tx: Option<broadcast::Sender<IngestProgress>>,
) -> IngestReport {
    let t0 = std::time::Instant::now();
    let now = deps.clock.now();
    let today = deps.clock.today();

    let emit = |stage: &str, message: String, total: usize, done: usize| {
        if let Some(ref tx) = progress_tx {
            let _ = tx.send(IngestProgress {
                stage: stage.to_string(),
                message,
                papers_total: total,
                papers_done: done,
            });
        }
    };

    // ── Entry guard ──────────────────────────────────────────────────────────
    let meta = match deps.store.metadata().await {
        Ok(meta) => meta,
        Err(e) => {
            warn!(error = %e, "Could not read processing metadata");
            let mut report = IngestReport::new(today, RunStatus::Failed);
            report.errors.push(format!("metadata read: {e}"));
            report.duration_ms = t0.elapsed().as_millis() as u64;
            return report;
        }
    };

    if let Some(status) = should_skip(&meta, now, today, policy) {
        info!(?status, last_processed = ?meta.last_processed_date, "Run skipped");
        let mut report = IngestReport::new(today, status);
        report.duration_ms = t0.elapsed().as_millis() as u64;
        return report;
    }

    // ── Transition to Running, durably, before any I/O ───────────────────────
    let running = ProcessingMetadata {
        last_processed_date: meta.last_processed_date,
        is_processing: true,
        started_at: Some(now),
    };
    if let Err(e) = write_metadata_with_retry(deps, policy, &running).await {
        let mut report = IngestReport::new(today, RunStatus::Failed);
        report.errors.push(format!("could not mark run active: {e}"));
        report.duration_ms = t0.elapsed().as_millis() as u64;
        return report;
    }

    info!(date = %today, "Daily ingest starting");
    emit("listing", "Fetching daily paper listing".to_string(), 0, 0);

    let mut report = IngestReport::new(today, RunStatus::Completed);

    // ── Listing fetch: fatal on failure, watermark untouched ─────────────────
    let entries = match deps.source.fetch_listing().await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "Listing fetch failed, aborting run");
            report.status = RunStatus::Failed;
            report.errors.push(e.to_string());
            clear_processing_flag(deps, policy, meta.last_processed_date).await;
            report.duration_ms = t0.elapsed().as_millis() as u64;
            emit("failed", format!("Listing fetch failed: {e}"), 0, 0);
            return report;
        }
    };
    report.papers_listed = entries.len();

    // ── Normalize, skipping malformed entries ────────────────────────────────
    let mut records = Vec::with_capacity(entries.len());
    for entry in &entries {
        match normalize(entry, &deps.document_url_template, now) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(error = %e, "Skipping malformed listing entry");
                report.malformed_skipped += 1;
                report.errors.push(e.to_string());
            }
        }
    }
    emit(
        "download",
        format!("{} papers listed, downloading documents", records.len()),
        records.len(),
        0,
    );

    // ── Concurrent document fan-out ──────────────────────────────────────────
    let batch = deps.fetcher.download_all(&records, today).await;
    report.downloads_ok = batch.ok_count();
    report.downloads_failed = records.len().saturating_sub(batch.ok_count());

    // ── Per-paper: enrich (tolerating failure), then upsert ──────────────────
    let total = records.len();
    for (done, mut record) in records.into_iter().enumerate() {
        let document = batch.path_for(&record.paper_id);

        if document.is_some() {
            match deps.enricher.explain(&record, document).await {
                Ok(explanation) => {
                    record.explanation = Some(explanation);
                    report.enriched += 1;
                }
                Err(e) => {
                    // Record still persists; a later run can fill this in.
                    warn!(paper_id = %record.paper_id, error = %e, "Enrichment failed");
                    report.enrichment_failed += 1;
                    report.errors.push(format!("{}: {e}", record.paper_id));
                }
            }
        } else if let Some(crate::models::DownloadOutcome::Failure(reason)) =
            batch.outcomes.get(&record.paper_id)
        {
            let e = PaperfluxError::DownloadFailed(reason.clone());
            report.errors.push(format!("{}: {e}", record.paper_id));
        }

        match upsert_with_retry(deps, policy, &record).await {
            Ok(()) => {
                report.papers_upserted += 1;
                info!(
                    paper_id = %record.paper_id,
                    enriched = record.explanation.is_some(),
                    "Paper ingested"
                );
            }
            Err(e) => {
                warn!(paper_id = %record.paper_id, error = %e, "Paper could not be persisted");
                report.upserts_failed += 1;
                report.errors.push(format!("{}: {e}", record.paper_id));
            }
        }

        emit(
            "process",
            format!("Processed {}", record.paper_id),
            total,
            done + 1,
        );
    }

    // ── Terminal transition ──────────────────────────────────────────────────
    // The watermark advances only when every record landed in the store;
    // a paper the store refused would otherwise be unreachable for the
    // rest of the day. Retries on the upsert already happened above.
    if report.upserts_failed > 0 {
        warn!(
            upserts_failed = report.upserts_failed,
            "Persistence incomplete, watermark not advanced"
        );
        report.status = RunStatus::Failed;
        clear_processing_flag(deps, policy, meta.last_processed_date).await;
    } else {
        let completed = ProcessingMetadata {
            last_processed_date: Some(today),
            is_processing: false,
            started_at: None,
        };
        if let Err(e) = write_metadata_with_retry(deps, policy, &completed).await {
            // Papers are persisted but the day may re-run; upserts make that safe.
            warn!(error = %e, "Could not advance watermark");
            report.status = RunStatus::Failed;
            report.errors.push(format!("watermark write: {e}"));
        }
    }

    report.duration_ms = t0.elapsed().as_millis() as u64;
    info!(
        date            = %today,
        listed          = report.papers_listed,
        malformed       = report.malformed_skipped,
        downloads_ok    = report.downloads_ok,
        enriched        = report.enriched,
        upserted        = report.papers_upserted,
        errors          = report.errors.len(),
        duration_ms     = report.duration_ms,
        "Daily ingest finished"
    );
    let stage = if report.status == RunStatus::Completed {
        "complete"
    } else {
        "failed"
    };
    emit(
        stage,
        format!(
            "Done. {} papers persisted, {} enriched, {} errors.",
            report.papers_upserted,
            report.enriched,
            report.errors.len()
        ),
        total,
        total,
    );

    report
}

/// Best-effort flag clear on the fatal path. The watermark is left alone.
async fn clear_processing_flag(
    deps: &IngestDeps,
    policy: &IngestPolicy,
    last_processed_date: Option<NaiveDate>,
) {
    let idle = ProcessingMetadata {
        last_processed_date,
        is_processing: false,
        started_at: None,
    };
    if let Err(e) = write_metadata_with_retry(deps, policy, &idle).await {
        // The lease expiry makes even this survivable.
        warn!(error = %e, "Could not clear processing flag after failure");
    }
}

/// Paper upserts share the metadata write-retry policy. One that still
/// fails is a `StoreWrite` the caller escalates to a failed run.
async fn upsert_with_retry(
    deps: &IngestDeps,
    policy: &IngestPolicy,
    record: &PaperRecord,
) -> paperflux_common::Result<()> {
    let mut last_err = None;
    for attempt in 1..=policy.metadata_write_attempts {
        match deps.store.upsert_paper(record).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(attempt, paper_id = %record.paper_id, error = %e, "Paper upsert failed");
                last_err = Some(e);
                if attempt < policy.metadata_write_attempts {
                    tokio::time::sleep(std::time::Duration::from_millis(100 << attempt)).await;
                }
            }
        }
    }
    Err(PaperfluxError::StoreWrite(format!(
        "paper upsert failed after {} attempts: {}",
        policy.metadata_write_attempts,
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// Metadata writes decide run outcome, so they get retried with a doubling
/// backoff before the run surfaces a fatal `StoreWrite`.
async fn write_metadata_with_retry(
    deps: &IngestDeps,
    policy: &IngestPolicy,
    meta: &ProcessingMetadata,
) -> paperflux_common::Result<()> {
    let mut last_err = None;
    for attempt in 1..=policy.metadata_write_attempts {
        match deps.store.set_metadata(meta).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(attempt, error = %e, "Metadata write failed");
                last_err = Some(e);
                if attempt < policy.metadata_write_attempts {
                    tokio::time::sleep(std::time::Duration::from_millis(100 << attempt)).await;
                }
            }
        }
    }
    Err(PaperfluxError::StoreWrite(format!(
        "metadata write failed after {} attempts: {}",
        policy.metadata_write_attempts,
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}
