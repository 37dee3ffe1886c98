use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaperfluxError {
    /// The listing endpoint could not be reached or returned non-200.
    /// Fatal for the current run; the watermark does not advance.
    #[error("Listing source unavailable: {0}")]
    SourceUnavailable(String),

    /// A listing entry was missing a required field or had the wrong shape.
    /// Per-item: the entry is skipped and counted, never fatal.
    #[error("Malformed listing entry: {0}")]
    MalformedEntry(String),

    /// A single document download failed. Per-item: the bibliographic
    /// record is still persisted, only enrichment is withheld.
    #[error("Document download failed: {0}")]
    DownloadFailed(String),

    /// The enrichment service failed after retries. Per-item.
    #[error("Enrichment failed: {0}")]
    EnrichmentFailed(String),

    /// A store write failed after retries. Escalates to a fatal run error
    /// when the metadata record is involved.
    #[error("Store write failed: {0}")]
    StoreWrite(String),

    #[error("Domain not in allowlist: {0}")]
    DomainBlocked(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PaperfluxError>;
