//! Shared application state for the web server.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use paperflux_common::Config;
use paperflux_db::PaperStore;
use paperflux_ingestion::pipeline::RunStatus;

/// Events pushed to connected clients via SSE.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    /// Ingest run progress update
    RunProgress {
        stage: String,
        message: String,
        papers_total: usize,
        papers_done: usize,
    },
    /// Ingest run finished (any terminal status)
    RunFinished {
        status: RunStatus,
        papers_upserted: usize,
        errors: usize,
    },
}

/// Shared state injected into every Axum handler.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn PaperStore>,
    /// Broadcast channel for SSE push events
    pub event_tx: broadcast::Sender<AppEvent>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn PaperStore>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config,
            store,
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.event_tx.subscribe()
    }
}

pub type SharedState = Arc<AppState>;
