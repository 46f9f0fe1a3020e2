//! # Observability Module
//!
//! Structured logging setup for the synchronization layer. Components log through
//! the `tracing` macros; this module only installs the subscriber.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};
