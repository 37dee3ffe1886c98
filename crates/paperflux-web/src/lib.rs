//! paperflux-web — thin browsing and trigger surface over the store.
//!
//! The web layer only reads records and status; the ingest run itself is
//! spawned onto a background task and observed through SSE.

pub mod handlers;
pub mod router;
pub mod sse;
pub mod state;
