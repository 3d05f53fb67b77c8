//! # Sync Engine
//!
//! The single owned instance of the synchronization core. It builds the event
//! registry, connection manager and update processor from one [`SyncConfig`],
//! wires them together and exposes the consumer-facing surface:
//!
//! * every published raw event also feeds the update processor;
//! * a successful reconnection makes the processor ask for a full snapshot,
//!   which the connection sends as an outbound `request_full_update`;
//! * with `refreshIntervalMs > 0` a full snapshot is also requested
//!   periodically while connected.
//!
//! Construct one per process (or per test) with [`SyncEngine::init`] and call
//! [`SyncEngine::teardown`] before dropping it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::configs::{ConfigError, SyncConfig};
use crate::core::connection::{ConnectionManager, ConnectionState, ConnectionStats};
use crate::core::listeners::Subscription;
use crate::core::processor::{DataUpdateEvent, FlushSummary, UpdateQueueProcessor};
use crate::core::registry::EventRegistry;
use crate::core::snapshot::DataSnapshot;
use crate::core::tasks::{TaskArena, TaskKind};
use crate::models::{GuardianType, OutboundMessage, RawEvent};
use crate::transport::Transport;

pub struct SyncEngine {
    config: SyncConfig,
    registry: Arc<EventRegistry>,
    connection: ConnectionManager,
    processor: UpdateQueueProcessor,
    wiring: Mutex<Vec<Subscription>>,
    tasks: TaskArena,
}

impl SyncEngine {
    /// Validates `config` and builds an engine with an empty snapshot.
    ///
    /// Must be called from within a tokio runtime: the staleness timer starts
    /// immediately.
    pub fn init(config: SyncConfig, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        Self::with_snapshot(config, transport, DataSnapshot::default())
    }

    /// Like [`init`](Self::init), starting from caller-supplied snapshot defaults.
    pub fn with_snapshot(
        config: SyncConfig,
        transport: Arc<dyn Transport>,
        initial: DataSnapshot,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let registry = Arc::new(EventRegistry::new(config.ring_buffer_size));
        let connection = ConnectionManager::new(transport, config.connection_config(), registry.clone());
        let processor = UpdateQueueProcessor::new(config.processor_config(), initial);

        let mut wiring = Vec::with_capacity(3);
        let p = processor.clone();
        wiring.push(registry.subscribe_all(move |event| {
            p.handle_event(event);
            Ok(())
        }));
        let p = processor.clone();
        wiring.push(connection.on_resync(move |_| {
            p.request_full_update("reconnected");
            Ok(())
        }));
        let c = connection.clone();
        wiring.push(processor.on_full_update_request(move |reason| {
            if !c.send(&OutboundMessage::request_full_update(reason)) {
                log::debug!("Full update request ({}) not sent: {}", reason, c.state());
            }
            Ok(())
        }));

        let engine = Self {
            config,
            registry,
            connection,
            processor,
            wiring: Mutex::new(wiring),
            tasks: TaskArena::new("engine"),
        };
        if let Some(interval) = engine.config.refresh_interval() {
            engine.start_refresh(interval);
        }
        engine.processor.start();

        log::info!(
            "Sync engine ready for {} (batch {}ms, stale after {}ms)",
            engine.connection.endpoint(),
            engine.config.batch_window_ms,
            engine.config.stale_timeout_ms
        );
        Ok(engine)
    }

    fn start_refresh(&self, period: Duration) {
        let connection = self.connection.clone();
        let processor = self.processor.clone();
        self.tasks.spawn(TaskKind::Refresh, async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if connection.state() == ConnectionState::Connected {
                    processor.request_full_update("scheduled refresh");
                }
            }
        });
    }

    pub async fn connect(&self) -> ConnectionState {
        self.connection.connect().await
    }

    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Manual override: drop the current session and connect again now.
    pub async fn reconnect(&self) -> ConnectionState {
        self.connection.reconnect().await
    }

    /// Registers a handler for raw events of `event_type`.
    pub fn subscribe<F>(&self, event_type: &str, handler: F) -> Subscription
    where
        F: Fn(&RawEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.registry.subscribe(event_type, handler)
    }

    /// The most recent `limit` raw events.
    pub fn recent_events(&self, limit: usize) -> Vec<RawEvent> {
        self.registry.recent_events(limit)
    }

    pub fn snapshot(&self) -> Arc<DataSnapshot> {
        self.processor.snapshot()
    }

    pub fn on_state_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ConnectionState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.connection.on_state_change(handler)
    }

    /// Registers a handler for processed snapshot revisions and staleness.
    pub fn on_data_update<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&DataUpdateEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.processor.on_data_update(handler)
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.connection.stats()
    }

    /// Applies `data` as a full update right away, bypassing the socket.
    pub fn force_full_update(&self, data: Value) -> FlushSummary {
        self.processor.force_full_update(data)
    }

    /// Fire-and-forget outbound message; `false` when not connected.
    pub fn send<M: Serialize>(&self, message: &M) -> bool {
        self.connection.send(message)
    }

    /// Asks the server for a full snapshot.
    pub fn request_full_update(&self, reason: &str) -> bool {
        self.connection.send(&OutboundMessage::request_full_update(reason))
    }

    /// Asks the server to run `action` on one guardian.
    pub fn trigger_guardian_action(&self, guardian: GuardianType, action: &str) -> bool {
        self.connection
            .send(&OutboundMessage::trigger_guardian_action(guardian, action))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn processor(&self) -> &UpdateQueueProcessor {
        &self.processor
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Disconnects, cancels every timer and drops all handlers. Idempotent.
    pub fn teardown(&self) {
        for sub in self.wiring.lock().drain(..) {
            sub.unsubscribe();
        }
        self.tasks.cancel_all();
        self.connection.shutdown();
        self.processor.shutdown();
        self.processor.clear_handlers();
        self.registry.clear_handlers();
        log::info!("Sync engine torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelTransport, ServerEnd};
    use serde_json::json;
    use tokio::sync::mpsc;

    fn config() -> SyncConfig {
        SyncConfig {
            base_delay_ms: 200,
            max_delay_ms: 2_000,
            jitter_ratio: 0.0,
            batch_window_ms: 50,
            stale_timeout_ms: 5_000,
            ..SyncConfig::default()
        }
    }

    fn engine(config: SyncConfig) -> (SyncEngine, mpsc::UnboundedReceiver<ServerEnd>) {
        let (transport, accepted) = ChannelTransport::new();
        let engine = SyncEngine::init(config, Arc::new(transport)).unwrap();
        (engine, accepted)
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn message_type(text: &str) -> String {
        serde_json::from_str::<Value>(text).unwrap()["type"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn guardian_event_reaches_snapshot() {
        let (engine, mut accepted) = engine(config());
        engine.connect().await;
        let server = accepted.recv().await.unwrap();

        server.push_json(&json!({
            "type": "guardian_update",
            "data": {"guardianType": "architecture", "score": 0.8}
        }));
        sleep_ms(60).await;

        let snap = engine.snapshot();
        assert_eq!(snap.report(GuardianType::Architecture).map(|r| r.score), Some(0.8));
        assert_eq!(snap.update_count, 1);
        assert_eq!(engine.stats().total_events_received, 1);
        assert_eq!(engine.recent_events(5).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_requests_full_update() {
        let (engine, mut accepted) = engine(config());
        engine.connect().await;
        drop(accepted.recv().await);
        sleep_ms(1).await;
        assert_eq!(engine.state(), ConnectionState::Reconnecting);
        assert_eq!(engine.stats().reconnect_attempts, 1);

        sleep_ms(200).await;
        let mut server = accepted.recv().await.unwrap();
        assert_eq!(engine.state(), ConnectionState::Connected);
        assert_eq!(engine.stats().reconnect_attempts, 0);

        let request = server.recv().await.unwrap();
        assert_eq!(message_type(&request), "request_full_update");
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_same_guardian_is_one_revision() {
        let (engine, mut accepted) = engine(config());
        let revisions = Arc::new(Mutex::new(0u32));
        let r = revisions.clone();
        let _ = engine.on_data_update(move |e| {
            if matches!(e, DataUpdateEvent::Updated { .. }) {
                *r.lock() += 1;
            }
            Ok(())
        });
        engine.connect().await;
        let server = accepted.recv().await.unwrap();

        for score in [0.5, 0.9] {
            server.push_json(&json!({
                "type": "guardian_status_changed",
                "data": {"guardianType": "ux", "score": score}
            }));
        }
        sleep_ms(60).await;

        assert_eq!(engine.snapshot().report(GuardianType::Ux).map(|r| r.score), Some(0.9));
        assert_eq!(engine.snapshot().update_count, 1);
        assert_eq!(*revisions.lock(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_snapshot_goes_stale_and_recovers() {
        let (engine, mut accepted) = engine(config());
        engine.connect().await;
        let server = accepted.recv().await.unwrap();

        sleep_ms(5_001).await;
        assert!(engine.snapshot().is_stale);

        server.push_json(&json!({"type": "system_health", "data": {"uptimeMs": 99}}));
        sleep_ms(60).await;
        let snap = engine.snapshot();
        assert!(!snap.is_stale);
        assert_eq!(snap.system_health.uptime_ms, 99);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_refresh_only_while_connected() {
        let (engine, mut accepted) = engine(SyncConfig {
            refresh_interval_ms: 1_000,
            ..config()
        });
        sleep_ms(1_500).await;

        engine.connect().await;
        let mut server = accepted.recv().await.unwrap();
        assert!(server.try_recv().is_none());

        sleep_ms(1_000).await;
        assert_eq!(message_type(&server.recv().await.unwrap()), "request_full_update");
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_helpers_need_a_connection() {
        let (engine, mut accepted) = engine(config());
        assert!(!engine.trigger_guardian_action(GuardianType::Ux, "analyze"));

        engine.connect().await;
        let mut server = accepted.recv().await.unwrap();
        assert!(engine.trigger_guardian_action(GuardianType::Ux, "analyze"));
        let text = server.recv().await.unwrap();
        assert_eq!(message_type(&text), "trigger_guardian_action");
    }

    #[tokio::test(start_paused = true)]
    async fn force_full_update_bypasses_socket() {
        let (engine, _accepted) = engine(config());
        let summary = engine.force_full_update(json!({
            "systemHealth": {"overallScore": 0.42, "guardiansActive": 4}
        }));

        assert!(summary.committed());
        assert_eq!(engine.snapshot().system_health.guardians_active, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_silences_everything() {
        let (engine, mut accepted) = engine(config());
        engine.connect().await;
        let mut server = accepted.recv().await.unwrap();

        engine.teardown();
        assert!(server.recv().await.is_none());
        assert_eq!(engine.state(), ConnectionState::Disconnected);

        sleep_ms(60_000).await;
        let snap = engine.snapshot();
        assert!(!snap.is_stale);
        assert_eq!(snap.update_count, 0);
        assert_eq!(engine.connection().stats().reconnect_attempts, 0);
        engine.teardown();
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let (transport, _accepted) = ChannelTransport::new();
        let result = SyncEngine::init(
            SyncConfig {
                batch_window_ms: 0,
                ..SyncConfig::default()
            },
            Arc::new(transport),
        );
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }
}
