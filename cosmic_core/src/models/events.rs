//! # Wire Frames and Update Classification
//!
//! Inbound frames arrive as JSON text shaped `{type, data, timestamp}`. They are
//! parsed into a [`RawEvent`], fanned out by the event registry, and classified
//! into an [`UpdateEvent`] by the update processor through the fixed
//! [`UpdateKind::classify`] table, the only server-specific knowledge in the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::guardian::GuardianType;

/// Failures while turning wire text or payloads into typed values.
///
/// Protocol errors are logged and the offending frame is dropped; they are
/// never propagated to consumers.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON or not a JSON object.
    #[error("invalid frame JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The frame carried no usable `type` string.
    #[error("frame is missing its `type` field")]
    MissingType,

    /// The frame carried a timestamp that could not be interpreted.
    #[error("invalid frame timestamp: {0}")]
    InvalidTimestamp(String),

    /// A payload did not decode into the shape its update kind requires.
    #[error("malformed {kind} payload: {reason}")]
    MalformedPayload {
        /// The update kind whose payload failed to decode.
        kind: UpdateKind,
        /// Decoder message.
        reason: String,
    },
}

/// The JSON shape of an inbound frame before validation.
#[derive(Debug, Deserialize)]
struct WireFrame {
    #[serde(rename = "type", default)]
    event_type: Option<String>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    timestamp: Option<WireTimestamp>,
}

/// Servers send either epoch milliseconds or an ISO-8601 string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Millis(f64),
    Text(String),
}

impl WireTimestamp {
    fn resolve(self) -> Result<DateTime<Utc>, ProtocolError> {
        match self {
            WireTimestamp::Millis(ms) => {
                if !ms.is_finite() {
                    return Err(ProtocolError::InvalidTimestamp(ms.to_string()));
                }
                DateTime::from_timestamp_millis(ms as i64)
                    .ok_or_else(|| ProtocolError::InvalidTimestamp(ms.to_string()))
            }
            WireTimestamp::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|_| ProtocolError::InvalidTimestamp(text)),
        }
    }
}

/// # Raw Event
///
/// One inbound frame after parsing. The payload stays opaque until the update
/// processor or a registered listener interprets it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    /// The server-assigned event type, e.g. `guardian_status_changed`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Opaque payload.
    pub data: Value,
    /// Server timestamp when the frame carried one, otherwise local receive time.
    pub timestamp: DateTime<Utc>,
    /// Local receive time.
    pub received_at: DateTime<Utc>,
    /// True when `timestamp` came from the server and can feed latency tracking.
    #[serde(skip)]
    pub server_stamped: bool,
}

impl RawEvent {
    /// Builds an event stamped with the local clock.
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        let now = Utc::now();
        Self {
            event_type: event_type.into(),
            data,
            timestamp: now,
            received_at: now,
            server_stamped: false,
        }
    }

    /// Parses one text frame received at `received_at`.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] when the text is not a JSON object, has no
    /// `type`, or carries an unreadable timestamp.
    pub fn from_frame(text: &str, received_at: DateTime<Utc>) -> Result<Self, ProtocolError> {
        let frame: WireFrame = serde_json::from_str(text)?;
        let event_type = frame
            .event_type
            .filter(|t| !t.trim().is_empty())
            .ok_or(ProtocolError::MissingType)?;

        let (timestamp, server_stamped) = match frame.timestamp {
            Some(ts) => (ts.resolve()?, true),
            None => (received_at, false),
        };

        Ok(Self {
            event_type,
            data: frame.data,
            timestamp,
            received_at,
            server_stamped,
        })
    }

    /// Milliseconds between the server timestamp and local receipt, clamped at
    /// zero. `None` when the frame carried no server timestamp.
    pub fn latency_ms(&self) -> Option<f64> {
        if !self.server_stamped {
            return None;
        }
        let delta = self.received_at.signed_duration_since(self.timestamp);
        Some((delta.num_microseconds().unwrap_or(i64::MAX) as f64 / 1000.0).max(0.0))
    }
}

/// The category an inbound event is merged as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// Replaces system health and every guardian report.
    FullUpdate,
    /// Shallow-merges fields into system health.
    PartialUpdate,
    /// Replaces the report of a single guardian.
    GuardianUpdate,
    /// Updates the philosophy-alignment portion of system health.
    PhilosophyUpdate,
}

impl UpdateKind {
    /// Maps a server event type to its update kind.
    ///
    /// Unmapped types are treated as partial updates.
    pub fn classify(event_type: &str) -> Self {
        match event_type {
            "full_update" | "system_snapshot" | "initial_state" | "dashboard_data" => {
                UpdateKind::FullUpdate
            }
            "guardian_update"
            | "guardian_status_changed"
            | "guardian_analysis_complete"
            | "guardian_report" => UpdateKind::GuardianUpdate,
            "philosophy_update" | "philosophy_alignment_change" | "philosophy_score" => {
                UpdateKind::PhilosophyUpdate
            }
            // partial_update, system_health, system_health_update,
            // validation_completed, metrics_update and anything unknown.
            _ => UpdateKind::PartialUpdate,
        }
    }

    /// The snake_case wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::FullUpdate => "full_update",
            UpdateKind::PartialUpdate => "partial_update",
            UpdateKind::GuardianUpdate => "guardian_update",
            UpdateKind::PhilosophyUpdate => "philosophy_update",
        }
    }
}

impl std::fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    /// Pushed by the server over the socket.
    Websocket,
    /// Triggered by a user or a test through the manual override.
    Manual,
    /// Synthesized by a scheduled refresh.
    Scheduled,
}

/// A classified update waiting in the processor queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEvent {
    /// Merge category.
    pub kind: UpdateKind,
    /// Payload, decoded according to `kind` at flush time.
    pub data: Value,
    /// Origin timestamp.
    pub timestamp: DateTime<Utc>,
    /// Origin channel.
    pub source: UpdateSource,
}

impl UpdateEvent {
    /// Builds an update stamped with the local clock.
    pub fn new(kind: UpdateKind, data: Value, source: UpdateSource) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
            source,
        }
    }

    /// Classifies a socket event.
    pub fn from_raw(event: &RawEvent) -> Self {
        Self {
            kind: UpdateKind::classify(&event.event_type),
            data: event.data.clone(),
            timestamp: event.timestamp,
            source: UpdateSource::Websocket,
        }
    }
}

/// A control message sent to the server. Fire-and-forget: any answer arrives
/// later as an ordinary inbound frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Message type understood by the server.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Message arguments.
    #[serde(default)]
    pub data: Value,
    /// Send time.
    pub timestamp: DateTime<Utc>,
}

impl OutboundMessage {
    /// Builds a message stamped with the local clock.
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    /// Asks the server for a complete system snapshot.
    pub fn request_full_update(reason: &str) -> Self {
        Self::new("request_full_update", serde_json::json!({ "reason": reason }))
    }

    /// Asks the server to run an action on one guardian.
    pub fn trigger_guardian_action(guardian: GuardianType, action: &str) -> Self {
        Self::new(
            "trigger_guardian_action",
            serde_json::json!({ "guardianType": guardian, "action": action }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_frame_with_iso_timestamp() {
        let received = DateTime::parse_from_rfc3339("2024-05-01T10:00:00.250Z")
            .unwrap()
            .with_timezone(&Utc);
        let text = r#"{"type":"guardian_update","data":{"score":0.8},"timestamp":"2024-05-01T10:00:00Z"}"#;
        let event = RawEvent::from_frame(text, received).unwrap();

        assert_eq!(event.event_type, "guardian_update");
        assert_eq!(event.data, json!({"score": 0.8}));
        assert!(event.server_stamped);
        assert_eq!(event.latency_ms(), Some(250.0));
    }

    #[test]
    fn parses_epoch_millis_and_clamps_skew() {
        let received = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let text = r#"{"type":"system_health","data":{},"timestamp":1700000000500}"#;
        let event = RawEvent::from_frame(text, received).unwrap();

        assert_eq!(event.timestamp.timestamp_millis(), 1_700_000_000_500);
        // Server clock ahead of ours: no negative latency.
        assert_eq!(event.latency_ms(), Some(0.0));
    }

    #[test]
    fn frame_without_timestamp_uses_receive_time() {
        let received = Utc::now();
        let event = RawEvent::from_frame(r#"{"type":"ping"}"#, received).unwrap();

        assert_eq!(event.timestamp, received);
        assert_eq!(event.data, Value::Null);
        assert_eq!(event.latency_ms(), None);
    }

    #[test]
    fn rejects_bad_frames() {
        let now = Utc::now();
        assert!(matches!(
            RawEvent::from_frame("not json", now),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            RawEvent::from_frame(r#"{"data":{}}"#, now),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            RawEvent::from_frame(r#"{"type":"  "}"#, now),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            RawEvent::from_frame(r#"{"type":"x","timestamp":"yesterday"}"#, now),
            Err(ProtocolError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn classification_table() {
        assert_eq!(UpdateKind::classify("full_update"), UpdateKind::FullUpdate);
        assert_eq!(UpdateKind::classify("initial_state"), UpdateKind::FullUpdate);
        assert_eq!(UpdateKind::classify("guardian_status_changed"), UpdateKind::GuardianUpdate);
        assert_eq!(UpdateKind::classify("guardian_analysis_complete"), UpdateKind::GuardianUpdate);
        assert_eq!(UpdateKind::classify("philosophy_alignment_change"), UpdateKind::PhilosophyUpdate);
        assert_eq!(UpdateKind::classify("validation_completed"), UpdateKind::PartialUpdate);
        assert_eq!(UpdateKind::classify("something_new"), UpdateKind::PartialUpdate);
    }

    #[test]
    fn outbound_messages_serialize_with_type_tag() {
        let msg = OutboundMessage::trigger_guardian_action(GuardianType::Ux, "analyze");
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["type"], "trigger_guardian_action");
        assert_eq!(value["data"]["guardianType"], "ux");
        assert_eq!(value["data"]["action"], "analyze");
    }
}
