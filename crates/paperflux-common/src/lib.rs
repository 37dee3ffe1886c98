//! paperflux-common — Shared errors, HTTP client, clock, and config used across all PaperFlux crates.

pub mod clock;
pub mod config;
pub mod error;
pub mod http;

// Re-export commonly used types
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use error::{PaperfluxError, Result};
pub use http::ScopedClient;
