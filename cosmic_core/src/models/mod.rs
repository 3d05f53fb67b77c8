//! # Data Models Module
//!
//! Value types that cross the boundaries of the synchronization core.
//!
//! ## Contained Modules:
//!
//! - **`events`**: The wire-level frames (`RawEvent`, `OutboundMessage`) and the
//!   classified `UpdateEvent` that the update processor queues and merges.
//! - **`guardian`**: The guardian domain values carried inside update payloads
//!   (`GuardianType`, `AnalysisReport`, `PhilosophyAlignment`, `SystemHealth`).
//!
//! The core never computes analysis results; these types only describe what the
//! server pushes so the processor can merge it into the snapshot.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Wire frames, update classification and outbound control messages.
pub mod events;
/// Guardian reports, philosophy alignment and system health values.
pub mod guardian;

// --- Public API Re-exports ---
pub use events::{OutboundMessage, ProtocolError, RawEvent, UpdateEvent, UpdateKind, UpdateSource};
pub use guardian::{AnalysisReport, GuardianType, PhilosophyAlignment, SystemHealth};
