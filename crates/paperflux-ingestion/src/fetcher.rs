//! Concurrent document fetcher.
//!
//! One task per paper, capped by a semaphore so a large listing cannot
//! overwhelm the remote host or exhaust local descriptors. Every task has
//! its own timeout — a hung transfer fails that paper only, never the
//! fan-out. Partial success is the normal case for a daily batch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use paperflux_common::config::FetcherConfig;
use paperflux_common::{PaperfluxError, Result, ScopedClient};
use paperflux_db::PaperRecord;

use crate::models::{sanitize_paper_id, BatchDownload, DownloadOutcome};

/// Download seam consumed by the orchestrator; mocked in pipeline tests.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Exactly one outcome per input record, in no particular order.
    async fn download_all(&self, records: &[PaperRecord], date: NaiveDate) -> BatchDownload;
}

pub struct HttpDocumentFetcher {
    client: ScopedClient,
    scratch_dir: PathBuf,
    limit: Arc<Semaphore>,
    download_timeout: Duration,
}

impl HttpDocumentFetcher {
    /// Creates the scratch directory if absent.
    pub fn new(cfg: &FetcherConfig) -> Result<Self> {
        let scratch_dir = PathBuf::from(&cfg.scratch_dir);
        std::fs::create_dir_all(&scratch_dir)
            .map_err(|e| PaperfluxError::Config(format!("create scratch dir: {e}")))?;
        Ok(Self {
            client: ScopedClient::new(Duration::from_secs(cfg.download_timeout_secs))?,
            scratch_dir,
            limit: Arc::new(Semaphore::new(cfg.max_concurrent_downloads.max(1))),
            download_timeout: Duration::from_secs(cfg.download_timeout_secs),
        })
    }

    /// Scratch file path for a paper on a given date:
    /// `{scratch_dir}/{date}_{sanitized_id}.pdf`.
    pub fn scratch_path(&self, date: NaiveDate, paper_id: &str) -> PathBuf {
        self.scratch_dir
            .join(format!("{date}_{}.pdf", sanitize_paper_id(paper_id)))
    }

    async fn download_one(
        client: ScopedClient,
        url: String,
        path: PathBuf,
    ) -> std::result::Result<PathBuf, String> {
        let resp = client
            .get(&url)
            .map_err(|e| e.to_string())?
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }

        let body = resp.bytes().await.map_err(|e| format!("body read: {e}"))?;
        tokio::fs::write(&path, &body)
            .await
            .map_err(|e| format!("write {}: {e}", path.display()))?;
        Ok(path)
    }
}

#[async_trait]
impl DocumentFetcher for HttpDocumentFetcher {
    #[instrument(skip(self, records), fields(n = records.len()))]
    async fn download_all(&self, records: &[PaperRecord], date: NaiveDate) -> BatchDownload {
        let mut handles = Vec::with_capacity(records.len());

        for record in records {
            let client = self.client.clone();
            let limit = self.limit.clone();
            let timeout = self.download_timeout;
            let url = record.document_url.clone();
            let path = self.scratch_path(date, &record.paper_id);
            let paper_id = record.paper_id.clone();

            let task = tokio::spawn(async move {
                // Permit held for the whole transfer; closed-semaphore
                // acquire cannot happen here (we never close it).
                let _permit = limit.acquire_owned().await.expect("semaphore closed");
                match tokio::time::timeout(timeout, Self::download_one(client, url, path)).await {
                    Ok(Ok(path)) => {
                        debug!(paper_id = %paper_id, "Document downloaded");
                        DownloadOutcome::Success(path)
                    }
                    Ok(Err(reason)) => {
                        warn!(paper_id = %paper_id, %reason, "Document download failed");
                        DownloadOutcome::Failure(reason)
                    }
                    Err(_) => {
                        warn!(paper_id = %paper_id, "Document download timed out");
                        DownloadOutcome::Failure("timed out".to_string())
                    }
                }
            });
            // The id stays on this side of the spawn so even a panicked
            // task still produces an outcome for its paper.
            handles.push((record.paper_id.clone(), task));
        }

        let mut batch = BatchDownload::default();
        for (paper_id, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(paper_id = %paper_id, error = %e, "Download task panicked");
                    DownloadOutcome::Failure("download task panicked".to_string())
                }
            };
            batch.outcomes.insert(paper_id, outcome);
        }

        info!(ok = batch.ok_count(), total = batch.total(), "Download batch finished");
        batch
    }
}
