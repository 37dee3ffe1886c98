//! Enrichment client — long-form explanation generation.
//!
//! Treated as an opaque text-in/text-out service with retry-worthy
//! failure modes. The concrete backend is the Gemini `generateContent`
//! API; the downloaded PDF rides along inline when available.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use tracing::{debug, instrument, warn};

use paperflux_common::config::EnrichmentConfig;
use paperflux_common::{PaperfluxError, Result, ScopedClient};
use paperflux_db::PaperRecord;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Enrichment seam consumed by the orchestrator; mocked in pipeline tests.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Produce an extended explanation for one paper. `document` is the
    /// locally downloaded PDF, when the download succeeded.
    async fn explain(&self, record: &PaperRecord, document: Option<&Path>) -> Result<String>;
}

pub struct GeminiEnricher {
    client: ScopedClient,
    model: String,
    api_key: String,
    max_attempts: u32,
}

impl GeminiEnricher {
    /// Key comes from config or the GEMINI_API_KEY env var.
    pub fn new(cfg: &EnrichmentConfig) -> Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .ok_or_else(|| {
                PaperfluxError::Config("no Gemini API key configured".to_string())
            })?;
        Ok(Self {
            client: ScopedClient::new(Duration::from_secs(cfg.timeout_secs))?,
            model: cfg.model.clone(),
            api_key,
            max_attempts: cfg.max_attempts.max(1),
        })
    }

    fn build_request(record: &PaperRecord, pdf: Option<Vec<u8>>) -> serde_json::Value {
        let prompt = format!(
            "Explain the following research paper in depth for a technical reader. \
             Cover the problem, the method, the key results and the limitations.\n\n\
             Title: {}\n\nAbstract: {}",
            record.title, record.summary
        );

        let mut parts = vec![serde_json::json!({ "text": prompt })];
        if let Some(bytes) = pdf {
            parts.push(serde_json::json!({
                "inline_data": {
                    "mime_type": "application/pdf",
                    "data": base64::engine::general_purpose::STANDARD.encode(bytes),
                }
            }));
        }

        serde_json::json!({ "contents": [{ "parts": parts }] })
    }

    fn extract_text(body: &serde_json::Value) -> Option<String> {
        let parts = body["candidates"][0]["content"]["parts"].as_array()?;
        let text: String = parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    async fn call_once(&self, payload: &serde_json::Value) -> Result<String> {
        let url = format!(
            "{GEMINI_BASE_URL}/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let resp = self.client.post(&url)?.json(payload).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(PaperfluxError::EnrichmentFailed(format!(
                "HTTP {status}: {message}"
            )));
        }

        let body: serde_json::Value = resp.json().await?;
        Self::extract_text(&body)
            .ok_or_else(|| PaperfluxError::EnrichmentFailed("empty response".to_string()))
    }
}

#[async_trait]
impl Enricher for GeminiEnricher {
    #[instrument(skip(self, record, document), fields(paper_id = %record.paper_id))]
    async fn explain(&self, record: &PaperRecord, document: Option<&Path>) -> Result<String> {
        let pdf = match document {
            Some(path) => match tokio::fs::read(path).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    // Fall back to metadata-only enrichment.
                    warn!(path = %path.display(), error = %e, "Could not read document, enriching from abstract only");
                    None
                }
            },
            None => None,
        };
        let payload = Self::build_request(record, pdf);

        let mut last_err = None;
        for attempt in 1..=self.max_attempts {
            match self.call_once(&payload).await {
                Ok(text) => {
                    debug!(attempt, chars = text.len(), "Enrichment succeeded");
                    return Ok(text);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Enrichment attempt failed");
                    last_err = Some(e);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                    }
                }
            }
        }
        Err(match last_err {
            Some(PaperfluxError::EnrichmentFailed(m)) => PaperfluxError::EnrichmentFailed(m),
            Some(e) => PaperfluxError::EnrichmentFailed(e.to_string()),
            None => PaperfluxError::EnrichmentFailed("no attempts made".to_string()),
        })
    }
}

/// Stand-in used when no API key is configured: every paper persists
/// without an explanation, and a later configured run can fill them in.
pub struct DisabledEnricher;

#[async_trait]
impl Enricher for DisabledEnricher {
    async fn explain(&self, _record: &PaperRecord, _document: Option<&Path>) -> Result<String> {
        Err(PaperfluxError::EnrichmentFailed(
            "enrichment disabled: no API key configured".to_string(),
        ))
    }
}
