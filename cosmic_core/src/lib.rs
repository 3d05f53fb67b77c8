// Declare the modules to re-export
pub mod configs;
pub mod core;
#[cfg(feature = "loggers")]
pub mod loggers;
pub mod models;
pub mod transport;

// Re-export the consumer-facing surface
pub use crate::configs::{ConfigError, SyncConfig};
pub use crate::core::{
    ConnectionState, ConnectionStats, DataSnapshot, DataUpdateEvent, EventRegistry, Subscription,
    SyncEngine,
};
pub use crate::models::{GuardianType, OutboundMessage, RawEvent, UpdateKind};
pub use crate::transport::{Transport, TransportError};
