//! # Loggers Module
//!
//! Process-wide log setup for binaries embedding the synchronization core.
//! The library itself only talks to the `log` facade; this module wires that
//! facade to stdout and a rotating log file through `fern`.

/// fern dispatch setup and log-file rotation.
pub mod setup;

pub use setup::{cleanup_old_logs, parse_level, setup_logging};
