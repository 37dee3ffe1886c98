//! Orchestrator scenarios against the in-memory store and scripted
//! source/fetcher/enricher doubles. Everything here is deterministic:
//! the clock is pinned and no network is touched.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};

use paperflux_common::{Clock, FixedClock, PaperfluxError, Result};
use paperflux_db::{
    MemoryStore, PaperRecord, PaperStore, ProcessingMetadata, StoreError, StoreResult,
};
use paperflux_ingestion::enrichment::Enricher;
use paperflux_ingestion::fetcher::DocumentFetcher;
use paperflux_ingestion::models::{BatchDownload, DownloadOutcome, RawEntry};
use paperflux_ingestion::pipeline::{run_daily_ingest, IngestDeps, IngestPolicy, RunStatus};
use paperflux_ingestion::sources::ListingSource;

const TEMPLATE: &str = "https://arxiv.org/pdf/{id}.pdf";

// ── Doubles ───────────────────────────────────────────────────────────────────

struct StaticSource(Vec<RawEntry>);

#[async_trait]
impl ListingSource for StaticSource {
    async fn fetch_listing(&self) -> Result<Vec<RawEntry>> {
        Ok(self.0.clone())
    }
}

struct UnavailableSource;

#[async_trait]
impl ListingSource for UnavailableSource {
    async fn fetch_listing(&self) -> Result<Vec<RawEntry>> {
        Err(PaperfluxError::SourceUnavailable("HTTP 503".to_string()))
    }
}

/// Succeeds every download except the ids it is told to fail.
struct ScriptedFetcher {
    fail_ids: HashSet<String>,
}

impl ScriptedFetcher {
    fn all_ok() -> Self {
        Self {
            fail_ids: HashSet::new(),
        }
    }

    fn failing(ids: &[&str]) -> Self {
        Self {
            fail_ids: ids.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl DocumentFetcher for ScriptedFetcher {
    async fn download_all(&self, records: &[PaperRecord], date: NaiveDate) -> BatchDownload {
        let mut batch = BatchDownload::default();
        for record in records {
            let outcome = if self.fail_ids.contains(&record.paper_id) {
                DownloadOutcome::Failure("HTTP 404".to_string())
            } else {
                DownloadOutcome::Success(PathBuf::from(format!(
                    "/scratch/{date}_{}.pdf",
                    record.paper_id
                )))
            };
            batch.outcomes.insert(record.paper_id.clone(), outcome);
        }
        batch
    }
}

/// Explains every paper except the ids it is told to fail.
struct ScriptedEnricher {
    fail_ids: HashSet<String>,
}

impl ScriptedEnricher {
    fn all_ok() -> Self {
        Self {
            fail_ids: HashSet::new(),
        }
    }

    fn failing(ids: &[&str]) -> Self {
        Self {
            fail_ids: ids.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Enricher for ScriptedEnricher {
    async fn explain(&self, record: &PaperRecord, _document: Option<&Path>) -> Result<String> {
        if self.fail_ids.contains(&record.paper_id) {
            Err(PaperfluxError::EnrichmentFailed("timed out".to_string()))
        } else {
            Ok(format!("Explanation of {}", record.title))
        }
    }
}

/// Delegates to a MemoryStore but fails the first N metadata writes.
struct FlakyMetadataStore {
    inner: Arc<MemoryStore>,
    failures_left: AtomicU32,
}

#[async_trait]
impl PaperStore for FlakyMetadataStore {
    async fn get_paper(&self, paper_id: &str) -> StoreResult<Option<PaperRecord>> {
        self.inner.get_paper(paper_id).await
    }

    async fn upsert_paper(&self, record: &PaperRecord) -> StoreResult<()> {
        self.inner.upsert_paper(record).await
    }

    async fn list_papers(&self) -> StoreResult<Vec<PaperRecord>> {
        self.inner.list_papers().await
    }

    async fn metadata(&self) -> StoreResult<ProcessingMetadata> {
        self.inner.metadata().await
    }

    async fn set_metadata(&self, meta: &ProcessingMetadata) -> StoreResult<()> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Write("transient".to_string()));
        }
        self.inner.set_metadata(meta).await
    }
}

/// Delegates to a MemoryStore but rejects every upsert of one paper id,
/// counting the attempts it swallowed.
struct RejectingUpsertStore {
    inner: Arc<MemoryStore>,
    reject_id: String,
    attempts: AtomicU32,
}

#[async_trait]
impl PaperStore for RejectingUpsertStore {
    async fn get_paper(&self, paper_id: &str) -> StoreResult<Option<PaperRecord>> {
        self.inner.get_paper(paper_id).await
    }

    async fn upsert_paper(&self, record: &PaperRecord) -> StoreResult<()> {
        if record.paper_id == self.reject_id {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Write("disk full".to_string()));
        }
        self.inner.upsert_paper(record).await
    }

    async fn list_papers(&self) -> StoreResult<Vec<PaperRecord>> {
        self.inner.list_papers().await
    }

    async fn metadata(&self) -> StoreResult<ProcessingMetadata> {
        self.inner.metadata().await
    }

    async fn set_metadata(&self, meta: &ProcessingMetadata) -> StoreResult<()> {
        self.inner.set_metadata(meta).await
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn entry(id: &str) -> RawEntry {
    serde_json::from_value(serde_json::json!({
        "paper": {
            "id": id,
            "title": format!("Paper {id}"),
            "authors": [{"name": "A. One"}, {"name": "B. Two"}],
            "summary": format!("Summary of {id}."),
            "publishedAt": "2025-02-03T12:00:00Z",
        }
    }))
    .unwrap()
}

fn malformed_entry() -> RawEntry {
    serde_json::from_value(serde_json::json!({
        "paper": {
            "title": "No id here",
            "authors": [],
            "summary": "s",
            "publishedAt": "2025-02-03T12:00:00Z",
        }
    }))
    .unwrap()
}

fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock::at(
        Utc.with_ymd_and_hms(2025, 2, 4, 8, 0, 0).unwrap(),
    ))
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, 4).unwrap()
}

fn deps(
    source: impl ListingSource + 'static,
    fetcher: impl DocumentFetcher + 'static,
    enricher: impl Enricher + 'static,
    store: Arc<dyn PaperStore>,
) -> IngestDeps {
    IngestDeps {
        source: Arc::new(source),
        fetcher: Arc::new(fetcher),
        enricher: Arc::new(enricher),
        store,
        clock: fixed_clock(),
        document_url_template: TEMPLATE.to_string(),
    }
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn happy_path_persists_and_advances_watermark() {
    let store = MemoryStore::new();
    let deps = deps(
        StaticSource(vec![entry("a"), entry("b")]),
        ScriptedFetcher::all_ok(),
        ScriptedEnricher::all_ok(),
        store.clone(),
    );

    let report = run_daily_ingest(&deps, &IngestPolicy::default(), None).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.papers_listed, 2);
    assert_eq!(report.papers_upserted, 2);
    assert_eq!(report.enriched, 2);
    assert!(report.errors.is_empty());

    let meta = store.metadata().await.unwrap();
    assert_eq!(meta.last_processed_date, Some(today()));
    assert!(!meta.is_processing);
    assert!(meta.started_at.is_none());

    let a = store.get_paper("a").await.unwrap().unwrap();
    assert_eq!(a.document_url, "https://arxiv.org/pdf/a.pdf");
    assert!(a.explanation.as_deref().unwrap().contains("Paper a"));
}

#[tokio::test]
async fn malformed_entry_is_skipped_not_fatal() {
    // 3 entries, one missing `id` → 2 records in the store.
    let store = MemoryStore::new();
    let deps = deps(
        StaticSource(vec![entry("a"), malformed_entry(), entry("b")]),
        ScriptedFetcher::all_ok(),
        ScriptedEnricher::all_ok(),
        store.clone(),
    );

    let report = run_daily_ingest(&deps, &IngestPolicy::default(), None).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.papers_listed, 3);
    assert_eq!(report.malformed_skipped, 1);
    assert_eq!(report.papers_upserted, 2);
    assert_eq!(store.paper_count().await, 2);
}

#[tokio::test]
async fn download_failure_is_isolated_and_record_still_persists() {
    // 1 of 2 downloads 404s → both records stored, one unenriched.
    let store = MemoryStore::new();
    let deps = deps(
        StaticSource(vec![entry("ok"), entry("gone")]),
        ScriptedFetcher::failing(&["gone"]),
        ScriptedEnricher::all_ok(),
        store.clone(),
    );

    let report = run_daily_ingest(&deps, &IngestPolicy::default(), None).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.downloads_ok, 1);
    assert_eq!(report.downloads_failed, 1);
    assert_eq!(report.papers_upserted, 2);
    assert!(report
        .errors
        .iter()
        .any(|e| e.starts_with("gone: Document download failed: HTTP 404")));

    let ok = store.get_paper("ok").await.unwrap().unwrap();
    let gone = store.get_paper("gone").await.unwrap().unwrap();
    assert!(ok.explanation.is_some());
    assert!(gone.explanation.is_none());
}

#[tokio::test]
async fn enrichment_failure_is_isolated() {
    // Enrichment times out for 1 of 2 → both persisted, one explanation.
    let store = MemoryStore::new();
    let deps = deps(
        StaticSource(vec![entry("a"), entry("b")]),
        ScriptedFetcher::all_ok(),
        ScriptedEnricher::failing(&["b"]),
        store.clone(),
    );

    let report = run_daily_ingest(&deps, &IngestPolicy::default(), None).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.enriched, 1);
    assert_eq!(report.enrichment_failed, 1);
    assert_eq!(report.papers_upserted, 2);
    assert!(store.get_paper("a").await.unwrap().unwrap().explanation.is_some());
    assert!(store.get_paper("b").await.unwrap().unwrap().explanation.is_none());

    // The run still counts as done: watermark advanced.
    let meta = store.metadata().await.unwrap();
    assert_eq!(meta.last_processed_date, Some(today()));
}

#[tokio::test]
async fn listing_failure_leaves_watermark_untouched() {
    let store = MemoryStore::new();
    let yesterday = today().pred_opt().unwrap();
    store
        .set_metadata(&ProcessingMetadata {
            last_processed_date: Some(yesterday),
            is_processing: false,
            started_at: None,
        })
        .await
        .unwrap();

    let deps = deps(
        UnavailableSource,
        ScriptedFetcher::all_ok(),
        ScriptedEnricher::all_ok(),
        store.clone(),
    );

    let report = run_daily_ingest(&deps, &IngestPolicy::default(), None).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(store.paper_count().await, 0);

    let meta = store.metadata().await.unwrap();
    assert_eq!(meta.last_processed_date, Some(yesterday));
    assert!(!meta.is_processing);
}

#[tokio::test]
async fn second_run_same_day_is_skipped_and_convergent() {
    let store = MemoryStore::new();
    let deps = deps(
        StaticSource(vec![entry("a")]),
        ScriptedFetcher::all_ok(),
        ScriptedEnricher::all_ok(),
        store.clone(),
    );
    let policy = IngestPolicy::default();

    let first = run_daily_ingest(&deps, &policy, None).await;
    assert_eq!(first.status, RunStatus::Completed);
    let count_after_first = store.paper_count().await;
    let meta_after_first = store.metadata().await.unwrap();

    let second = run_daily_ingest(&deps, &policy, None).await;
    assert_eq!(second.status, RunStatus::SkippedAlreadyProcessed);
    assert_eq!(second.papers_upserted, 0);
    assert_eq!(store.paper_count().await, count_after_first);
    assert_eq!(store.metadata().await.unwrap(), meta_after_first);
}

#[tokio::test]
async fn watermark_advances_from_yesterday_to_today() {
    let store = MemoryStore::new();
    store
        .set_metadata(&ProcessingMetadata {
            last_processed_date: Some(today().pred_opt().unwrap()),
            is_processing: false,
            started_at: None,
        })
        .await
        .unwrap();

    let deps = deps(
        StaticSource(vec![entry("a")]),
        ScriptedFetcher::all_ok(),
        ScriptedEnricher::all_ok(),
        store.clone(),
    );

    let report = run_daily_ingest(&deps, &IngestPolicy::default(), None).await;

    assert_eq!(report.status, RunStatus::Completed);
    let meta = store.metadata().await.unwrap();
    assert_eq!(meta.last_processed_date, Some(today()));
    assert!(!meta.is_processing);
}

#[tokio::test]
async fn live_lease_blocks_a_second_run() {
    let store = MemoryStore::new();
    store
        .set_metadata(&ProcessingMetadata {
            last_processed_date: None,
            is_processing: true,
            started_at: Some(fixed_clock().now() - chrono::Duration::minutes(5)),
        })
        .await
        .unwrap();

    let deps = deps(
        StaticSource(vec![entry("a")]),
        ScriptedFetcher::all_ok(),
        ScriptedEnricher::all_ok(),
        store.clone(),
    );

    let report = run_daily_ingest(&deps, &IngestPolicy::default(), None).await;
    assert_eq!(report.status, RunStatus::SkippedInProgress);
    assert_eq!(store.paper_count().await, 0);
}

#[tokio::test]
async fn expired_lease_allows_restart() {
    let store = MemoryStore::new();
    store
        .set_metadata(&ProcessingMetadata {
            last_processed_date: None,
            is_processing: true,
            started_at: Some(fixed_clock().now() - chrono::Duration::hours(5)),
        })
        .await
        .unwrap();

    let deps = deps(
        StaticSource(vec![entry("a")]),
        ScriptedFetcher::all_ok(),
        ScriptedEnricher::all_ok(),
        store.clone(),
    );

    let report = run_daily_ingest(&deps, &IngestPolicy::default(), None).await;
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(store.paper_count().await, 1);
}

#[tokio::test]
async fn re_run_does_not_erase_earlier_explanation() {
    // Day 1 enriches; a forced re-run (expired lease, same listing) with a
    // broken enricher must not wipe the stored explanation.
    let store = MemoryStore::new();
    let deps_ok = deps(
        StaticSource(vec![entry("a")]),
        ScriptedFetcher::all_ok(),
        ScriptedEnricher::all_ok(),
        store.clone(),
    );
    run_daily_ingest(&deps_ok, &IngestPolicy::default(), None).await;
    assert!(store.get_paper("a").await.unwrap().unwrap().explanation.is_some());

    // Simulate an abandoned run so the guard lets us back in today.
    store
        .set_metadata(&ProcessingMetadata {
            last_processed_date: None,
            is_processing: true,
            started_at: None,
        })
        .await
        .unwrap();

    let deps_broken = deps(
        StaticSource(vec![entry("a")]),
        ScriptedFetcher::all_ok(),
        ScriptedEnricher::failing(&["a"]),
        store.clone(),
    );
    let report = run_daily_ingest(&deps_broken, &IngestPolicy::default(), None).await;

    assert_eq!(report.status, RunStatus::Completed);
    let a = store.get_paper("a").await.unwrap().unwrap();
    assert!(a.explanation.is_some(), "re-upsert erased the explanation");
}

#[tokio::test]
async fn unpersisted_paper_fails_the_run_and_holds_the_watermark() {
    // The store refuses one of two upserts for the whole run. The other
    // paper still lands, but the watermark must not advance: a completed
    // day with a missing record could never be retried.
    let inner = MemoryStore::new();
    let store = Arc::new(RejectingUpsertStore {
        inner: inner.clone(),
        reject_id: "b".to_string(),
        attempts: AtomicU32::new(0),
    });
    let deps_failing = deps(
        StaticSource(vec![entry("a"), entry("b")]),
        ScriptedFetcher::all_ok(),
        ScriptedEnricher::all_ok(),
        store.clone(),
    );
    let policy = IngestPolicy::default();

    let report = run_daily_ingest(&deps_failing, &policy, None).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.papers_upserted, 1);
    assert_eq!(report.upserts_failed, 1);
    assert!(inner.get_paper("a").await.unwrap().is_some());
    assert!(inner.get_paper("b").await.unwrap().is_none());

    // Upsert was retried before giving up.
    assert_eq!(
        store.attempts.load(Ordering::SeqCst),
        policy.metadata_write_attempts
    );

    // Watermark untouched and flag cleared, so the day stays retryable.
    let meta = inner.metadata().await.unwrap();
    assert_eq!(meta.last_processed_date, None);
    assert!(!meta.is_processing);

    // A healthy store on the retry converges.
    let deps_ok = deps(
        StaticSource(vec![entry("a"), entry("b")]),
        ScriptedFetcher::all_ok(),
        ScriptedEnricher::all_ok(),
        inner.clone(),
    );
    let retry = run_daily_ingest(&deps_ok, &policy, None).await;
    assert_eq!(retry.status, RunStatus::Completed);
    assert!(inner.get_paper("b").await.unwrap().is_some());
    assert_eq!(inner.metadata().await.unwrap().last_processed_date, Some(today()));
}

#[tokio::test]
async fn transient_metadata_write_is_retried() {
    let inner = MemoryStore::new();
    let store = Arc::new(FlakyMetadataStore {
        inner: inner.clone(),
        failures_left: AtomicU32::new(1),
    });
    let deps = deps(
        StaticSource(vec![entry("a")]),
        ScriptedFetcher::all_ok(),
        ScriptedEnricher::all_ok(),
        store,
    );

    let report = run_daily_ingest(&deps, &IngestPolicy::default(), None).await;

    assert_eq!(report.status, RunStatus::Completed);
    let meta = inner.metadata().await.unwrap();
    assert_eq!(meta.last_processed_date, Some(today()));
}

#[tokio::test]
async fn progress_events_cover_the_run() {
    let store = MemoryStore::new();
    let deps = deps(
        StaticSource(vec![entry("a"), entry("b")]),
        ScriptedFetcher::all_ok(),
        ScriptedEnricher::all_ok(),
        store,
    );
    let (tx, mut rx) = tokio::sync::broadcast::channel(64);

    run_daily_ingest(&deps, &IngestPolicy::default(), Some(tx)).await;

    let mut stages = Vec::new();
    while let Ok(event) = rx.try_recv() {
        stages.push(event.stage);
    }
    assert_eq!(stages.first().map(String::as_str), Some("listing"));
    assert_eq!(stages.last().map(String::as_str), Some("complete"));
    assert!(stages.iter().any(|s| s == "process"));
}
