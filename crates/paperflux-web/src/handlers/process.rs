//! Ingest trigger and status — the handler only reads status and spawns;
//! it never blocks on the run.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};

use paperflux_common::{Clock, SystemClock};
use paperflux_db::ProcessingMetadata;
use paperflux_ingestion::enrichment::{DisabledEnricher, Enricher, GeminiEnricher};
use paperflux_ingestion::fetcher::HttpDocumentFetcher;
use paperflux_ingestion::pipeline::{
    run_daily_ingest, should_skip, IngestDeps, IngestPolicy, IngestProgress, RunStatus,
};
use paperflux_ingestion::sources::daily_papers::DailyPapersClient;

use crate::state::{AppEvent, SharedState};

#[derive(Serialize)]
pub struct StatusDto {
    pub last_processed_date: Option<chrono::NaiveDate>,
    pub is_processing: bool,
    /// True when a "process now" trigger would actually start a run.
    pub eligible: bool,
}

pub fn status_of(meta: &ProcessingMetadata, policy: &IngestPolicy) -> StatusDto {
    let clock = SystemClock;
    let eligible = should_skip(meta, clock.now(), clock.today(), policy).is_none();
    StatusDto {
        last_processed_date: meta.last_processed_date,
        is_processing: meta.is_processing,
        eligible,
    }
}

pub async fn api_status(State(state): State<SharedState>) -> Json<StatusDto> {
    let meta = state.store.metadata().await.unwrap_or_default();
    let policy = IngestPolicy::from_config(&state.config.ingest);
    Json(status_of(&meta, &policy))
}

#[derive(Serialize)]
pub struct TriggerResponse {
    pub started: bool,
    pub reason: Option<String>,
}

/// POST /process — spawn today's run in the background and return
/// immediately. Eligibility is checked here so the response is honest;
/// the orchestrator's own entry guard remains authoritative under
/// races, so a double-click still cannot start two runs.
pub async fn process_run(
    State(state): State<SharedState>,
) -> Result<Json<TriggerResponse>, (StatusCode, String)> {
    let policy = IngestPolicy::from_config(&state.config.ingest);
    let meta = state.store.metadata().await.unwrap_or_default();
    let clock = SystemClock;
    if let Some(status) = should_skip(&meta, clock.now(), clock.today(), &policy) {
        let reason = match status {
            RunStatus::SkippedInProgress => "a run is already in progress",
            _ => "today's papers are already processed",
        };
        info!(?status, "Process trigger declined");
        return Ok(Json(TriggerResponse {
            started: false,
            reason: Some(reason.to_string()),
        }));
    }

    let deps = match build_deps(&state) {
        Ok(deps) => deps,
        Err(e) => {
            warn!(error = %e, "Could not assemble ingest dependencies");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    // Bridge pipeline progress into the app-wide SSE channel.
    let (progress_tx, mut progress_rx) =
        tokio::sync::broadcast::channel::<IngestProgress>(64);
    let event_tx = state.event_tx.clone();
    tokio::spawn(async move {
        while let Ok(p) = progress_rx.recv().await {
            let _ = event_tx.send(AppEvent::RunProgress {
                stage: p.stage,
                message: p.message,
                papers_total: p.papers_total,
                papers_done: p.papers_done,
            });
        }
    });

    let event_tx = state.event_tx.clone();
    tokio::spawn(async move {
        let report = run_daily_ingest(&deps, &policy, Some(progress_tx)).await;
        info!(status = ?report.status, upserted = report.papers_upserted, "Triggered run finished");
        let _ = event_tx.send(AppEvent::RunFinished {
            status: report.status,
            papers_upserted: report.papers_upserted,
            errors: report.errors.len(),
        });
    });

    Ok(Json(TriggerResponse {
        started: true,
        reason: None,
    }))
}

/// Assemble the concrete pipeline dependencies from config. Missing
/// enrichment credentials degrade to a disabled enricher rather than
/// blocking ingestion.
fn build_deps(state: &SharedState) -> paperflux_common::Result<IngestDeps> {
    let cfg = &state.config;
    let enricher: Arc<dyn Enricher> = match GeminiEnricher::new(&cfg.enrichment) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            warn!(error = %e, "Enrichment disabled for this run");
            Arc::new(DisabledEnricher)
        }
    };
    Ok(IngestDeps {
        source: Arc::new(DailyPapersClient::new(&cfg.listing)?),
        fetcher: Arc::new(HttpDocumentFetcher::new(&cfg.fetcher)?),
        enricher,
        store: state.store.clone(),
        clock: Arc::new(SystemClock),
        document_url_template: cfg.fetcher.document_url_template.clone(),
    })
}
