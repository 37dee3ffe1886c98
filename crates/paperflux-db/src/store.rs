//! Store trait and the in-memory backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreResult;
use crate::records::{PaperRecord, ProcessingMetadata};

/// Persistence seam consumed by the ingestion pipeline and the web layer.
///
/// Upsert is keyed by `paper_id`; backends must never let a re-upsert with
/// an absent `explanation` erase one that was stored earlier (re-running a
/// day is convergent modulo newly successful enrichment).
#[async_trait]
pub trait PaperStore: Send + Sync {
    async fn get_paper(&self, paper_id: &str) -> StoreResult<Option<PaperRecord>>;

    async fn upsert_paper(&self, record: &PaperRecord) -> StoreResult<()>;

    /// All records, newest published first.
    async fn list_papers(&self) -> StoreResult<Vec<PaperRecord>>;

    async fn metadata(&self) -> StoreResult<ProcessingMetadata>;

    async fn set_metadata(&self, meta: &ProcessingMetadata) -> StoreResult<()>;
}

/// In-memory store for tests and local demo mode.
#[derive(Default)]
pub struct MemoryStore {
    papers: RwLock<HashMap<String, PaperRecord>>,
    meta: RwLock<ProcessingMetadata>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn paper_count(&self) -> usize {
        self.papers.read().await.len()
    }
}

#[async_trait]
impl PaperStore for MemoryStore {
    async fn get_paper(&self, paper_id: &str) -> StoreResult<Option<PaperRecord>> {
        Ok(self.papers.read().await.get(paper_id).cloned())
    }

    async fn upsert_paper(&self, record: &PaperRecord) -> StoreResult<()> {
        let mut papers = self.papers.write().await;
        let mut incoming = record.clone();
        if incoming.explanation.is_none() {
            if let Some(existing) = papers.get(&incoming.paper_id) {
                incoming.explanation = existing.explanation.clone();
            }
        }
        papers.insert(incoming.paper_id.clone(), incoming);
        Ok(())
    }

    async fn list_papers(&self) -> StoreResult<Vec<PaperRecord>> {
        let mut all: Vec<PaperRecord> = self.papers.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(all)
    }

    async fn metadata(&self) -> StoreResult<ProcessingMetadata> {
        Ok(self.meta.read().await.clone())
    }

    async fn set_metadata(&self, meta: &ProcessingMetadata) -> StoreResult<()> {
        *self.meta.write().await = meta.clone();
        Ok(())
    }
}
