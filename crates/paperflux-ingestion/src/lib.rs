//! paperflux-ingestion — the daily ingestion pipeline.
//!
//! Flow for one run (see `pipeline::run_daily_ingest`):
//!   1. Entry guard against the processing-metadata watermark
//!   2. Fetch the day's listing from the source API
//!   3. Normalize raw entries into paper records (skip malformed)
//!   4. Download all documents concurrently (bounded, per-task timeout)
//!   5. Enrich each downloaded paper (failure tolerated per paper)
//!   6. Upsert every record; advance the watermark
//!
//! The pipeline is designed to be called from the web trigger
//! (`paperflux-web/src/handlers/process.rs`) on a background task.

pub mod enrichment;
pub mod fetcher;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod sources;

pub use models::{BatchDownload, DownloadOutcome, RawEntry};
pub use pipeline::{run_daily_ingest, IngestDeps, IngestPolicy, IngestProgress, IngestReport, RunStatus};
