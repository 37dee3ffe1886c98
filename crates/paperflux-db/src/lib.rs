//! paperflux-db — paper records, the store trait, and its backends.
//!
//! The pipeline only ever sees the [`store::PaperStore`] trait; the
//! in-memory backend serves tests and local demo mode, the PostgreSQL
//! backend serves deployment.

pub mod error;
pub mod pg;
pub mod records;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use pg::PgStore;
pub use records::{Author, PaperRecord, ProcessingMetadata};
pub use store::{MemoryStore, PaperStore};
