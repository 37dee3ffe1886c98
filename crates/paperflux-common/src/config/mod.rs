//! Configuration loading for PaperFlux.
//! Reads paperflux.toml from the current directory or path in PAPERFLUX_CONFIG env var.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PaperfluxError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Daily papers listing endpoint.
    #[serde(default = "default_listing_url")]
    pub url: String,
    #[serde(default = "default_listing_timeout")]
    pub timeout_secs: u64,
}

fn default_listing_url() -> String {
    "https://huggingface.co/api/daily_papers".to_string()
}
fn default_listing_timeout() -> u64 {
    30
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            url: default_listing_url(),
            timeout_secs: default_listing_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Document URL template; `{id}` is substituted with the paper id.
    /// The normalizer and the fetcher share this — it is the single source
    /// of truth for document URLs.
    #[serde(default = "default_document_url_template")]
    pub document_url_template: String,
    /// Scratch directory for downloaded documents. Created if absent,
    /// never cleaned up by the pipeline.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: String,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

fn default_document_url_template() -> String {
    "https://arxiv.org/pdf/{id}.pdf".to_string()
}
fn default_scratch_dir() -> String {
    "temp_papers".to_string()
}
fn default_max_concurrent() -> usize {
    32
}
fn default_download_timeout() -> u64 {
    60
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            document_url_template: default_document_url_template(),
            scratch_dir: default_scratch_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            download_timeout_secs: default_download_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_enrichment_model")]
    pub model: String,
    /// Read from GEMINI_API_KEY when absent.
    pub api_key: Option<String>,
    #[serde(default = "default_enrichment_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_enrichment_attempts")]
    pub max_attempts: u32,
}

fn default_enrichment_model() -> String {
    "gemini-1.5-pro".to_string()
}
fn default_enrichment_timeout() -> u64 {
    120
}
fn default_enrichment_attempts() -> u32 {
    3
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            model: default_enrichment_model(),
            api_key: None,
            timeout_secs: default_enrichment_timeout(),
            max_attempts: default_enrichment_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// An `is_processing` flag older than this is treated as an abandoned
    /// run (lease expiry) and does not block a restart.
    #[serde(default = "default_stale_run_after")]
    pub stale_run_after_mins: i64,
    /// Attempts for the processing-metadata write before the run fails.
    #[serde(default = "default_metadata_attempts")]
    pub metadata_write_attempts: u32,
}

fn default_stale_run_after() -> i64 {
    120
}
fn default_metadata_attempts() -> u32 {
    3
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            stale_run_after_mins: default_stale_run_after(),
            metadata_write_attempts: default_metadata_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// PostgreSQL connection string. When unset, the in-memory store is
    /// used (local demo mode; records do not survive a restart).
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:3001".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Config {
    /// Load from an explicit path.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| PaperfluxError::Config(format!("read {}: {e}", path.as_ref().display())))?;
        toml::from_str(&raw).map_err(|e| PaperfluxError::Config(format!("parse config: {e}")))
    }

    /// Load from PAPERFLUX_CONFIG, then ./paperflux.toml, then defaults.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("PAPERFLUX_CONFIG") {
            return Self::from_path(path);
        }
        if Path::new("paperflux.toml").exists() {
            return Self::from_path("paperflux.toml");
        }
        Ok(Self::default())
    }
}
