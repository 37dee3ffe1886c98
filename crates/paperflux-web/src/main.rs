//! PaperFlux web server
//!
//! Run with: cargo run -p paperflux-web

use std::sync::Arc;

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use paperflux_common::Config;
use paperflux_db::{MemoryStore, PaperStore, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load()?;
    info!("Starting PaperFlux web server...");

    let store: Arc<dyn PaperStore> = match &config.store.database_url {
        Some(url) => {
            info!("Using PostgreSQL store");
            Arc::new(PgStore::connect(url, config.store.max_connections).await?)
        }
        None => {
            warn!("No database configured; records will not survive a restart");
            MemoryStore::new()
        }
    };

    let bind = config.server.bind.clone();
    let state = paperflux_web::state::AppState::new(config, store);
    let app = paperflux_web::router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Server listening on http://{bind}");
    axum::serve(listener, app).await?;

    Ok(())
}
