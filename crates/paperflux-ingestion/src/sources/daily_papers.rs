//! Hugging Face daily-papers listing client.
//!
//! Single GET against the configured listing endpoint, 200-only. The body
//! is a JSON array of objects, each carrying a nested `paper` object with
//! the bibliographic fields the normalizer needs.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, instrument};

use paperflux_common::config::ListingConfig;
use paperflux_common::{PaperfluxError, Result, ScopedClient};

use super::ListingSource;
use crate::models::RawEntry;

pub struct DailyPapersClient {
    client: ScopedClient,
    url: String,
}

impl DailyPapersClient {
    pub fn new(cfg: &ListingConfig) -> Result<Self> {
        Ok(Self {
            client: ScopedClient::new(Duration::from_secs(cfg.timeout_secs))?,
            url: cfg.url.clone(),
        })
    }
}

#[async_trait]
impl ListingSource for DailyPapersClient {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch_listing(&self) -> Result<Vec<RawEntry>> {
        let resp = self
            .client
            .get(&self.url)?
            .send()
            .await
            .map_err(|e| PaperfluxError::SourceUnavailable(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(PaperfluxError::SourceUnavailable(format!(
                "HTTP {}",
                resp.status()
            )));
        }

        let entries: Vec<RawEntry> = resp
            .json()
            .await
            .map_err(|e| PaperfluxError::SourceUnavailable(format!("listing decode: {e}")))?;

        info!(n = entries.len(), "Daily listing fetched");
        Ok(entries)
    }
}
