//! # Core Engine Module
//!
//! The real-time synchronization core. It keeps a local read-model of guardian
//! and system-health data in sync with a server, surviving disconnects, bursts
//! of events and idle periods, and hands consumers one consistent snapshot.
//!
//! ## Core Components:
//!
//! - **`connection`**: Owns the socket lifecycle. Reconnects with exponential
//!   backoff and jitter, tracks connection statistics (including an EWMA of
//!   receive latency) and signals resynchronization after every reconnect.
//!
//! - **`registry`**: The publish/subscribe directory for raw events, keyed by
//!   event type, with a bounded ring of recent events for late joiners.
//!
//! - **`processor`**: Classifies raw events, micro-batches them, coalesces per
//!   kind and merges them into the snapshot. Also owns staleness detection.
//!
//! - **`snapshot`**: The `DataSnapshot` read-model and its per-kind merge
//!   policies.
//!
//! - **`engine`**: The single owned instance wiring the three components
//!   together, with explicit `init` and `teardown`.
//!
//! Supporting pieces: `listeners` (ordered handler lists with precise
//! unsubscribe), `tasks` (cancellable background tasks keyed by purpose) and
//! `backoff` (the reconnect delay policy).

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Exponential reconnect delay with jitter.
pub mod backoff;
/// The socket lifecycle, reconnection and connection statistics.
pub mod connection;
/// The single owned instance wiring the core together.
pub mod engine;
/// Ordered handler lists and their subscriptions.
pub mod listeners;
/// Batching, coalescing and staleness over the snapshot.
pub mod processor;
/// Typed publish/subscribe over raw events.
pub mod registry;
/// The consumer-visible read-model and merge policies.
pub mod snapshot;
/// Background tasks keyed by purpose.
pub mod tasks;

// --- Public API Re-exports ---
pub use backoff::BackoffPolicy;
pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState, ConnectionStats, ResyncSignal};
pub use engine::SyncEngine;
pub use listeners::Subscription;
pub use processor::{DataUpdateEvent, FlushSummary, ProcessorConfig, UpdateQueueProcessor};
pub use registry::EventRegistry;
pub use snapshot::{DataSnapshot, MergeError};
