//! # Observability
//!
//! Structured logging through `tracing`. Secret material never appears in log
//! fields; only lease identifiers, paths and credential kinds do.

pub mod logging;

pub use logging::{init_logging, LogFormat};
