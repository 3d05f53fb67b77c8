//! # Configuration Modules
//!
//! Tuning of the synchronization core: reconnect backoff, batching, staleness,
//! ring size and latency smoothing. Every option has a default, so an empty
//! JSON5 document is a valid configuration.

/// Defaults, validation and JSON5 loading of [`SyncConfig`](sync_config::SyncConfig).
pub mod sync_config;

pub use sync_config::{ConfigError, SyncConfig};
