//! Listing source clients.

pub mod daily_papers;

use async_trait::async_trait;

use paperflux_common::Result;

use crate::models::RawEntry;

/// Common interface for listing sources.
///
/// The listing is the unit of truth for "what to process today": a source
/// either returns the complete day's list or fails the run with
/// `SourceUnavailable`. No retry happens at this layer.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch_listing(&self) -> Result<Vec<RawEntry>>;
}
