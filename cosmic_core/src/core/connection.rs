//! # Connection Manager
//!
//! Owns the lifecycle of the single logical connection to the server:
//!
//! * `connect()` opens a session through the configured [`Transport`];
//! * every text frame is parsed into a [`RawEvent`], counted in the stats and
//!   published on the [`EventRegistry`];
//! * any close that the user did not ask for moves the state to
//!   `reconnecting` and arms a retry with exponential backoff and jitter,
//!   forever, until `disconnect()`;
//! * every successful *re*connection emits a [`ResyncSignal`] so the snapshot
//!   can be rebuilt from a full update.
//!
//! Sessions are numbered by an epoch. `disconnect()` and `reconnect()` bump
//! it, so a late reader or retry timer of an older session can never act on
//! the current one.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::backoff::BackoffPolicy;
use crate::core::listeners::{Listeners, Subscription};
use crate::core::registry::EventRegistry;
use crate::core::tasks::{TaskArena, TaskKind};
use crate::models::RawEvent;
use crate::transport::{Transport, TransportError, TransportSession};

/// Lifecycle state of the connection. Exactly one holds at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Connection Stats
///
/// Counters reset only on an explicit fresh `connect()`; `reconnect_attempts`
/// also drops back to 0 on every successful connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub connected_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub reconnect_attempts: u32,
    pub total_events_received: u64,
    pub last_event_at: Option<DateTime<Utc>>,
    /// EWMA of receive latency in milliseconds.
    pub average_latency: f64,
    /// Latency samples folded into `average_latency`.
    pub latency_samples: u64,
    /// When the pending reconnect attempt fires, if one is armed.
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl ConnectionStats {
    /// Folds a latency sample into the moving average. The first sample seeds
    /// the average; later ones get weight `alpha`.
    pub fn record_latency(&mut self, sample_ms: f64, alpha: f64) {
        let sample = sample_ms.max(0.0);
        self.average_latency = if self.latency_samples == 0 {
            sample
        } else {
            alpha * sample + (1.0 - alpha) * self.average_latency
        };
        self.latency_samples += 1;
    }
}

/// Emitted after a successful reconnection.
#[derive(Debug, Clone, PartialEq)]
pub struct ResyncSignal {
    /// Failed attempts before this success.
    pub attempts: u32,
    pub at: DateTime<Utc>,
}

/// Reconnect and latency tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionConfig {
    pub backoff: BackoffPolicy,
    /// Weight of the newest latency sample, in `(0, 1]`.
    pub latency_smoothing: f64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            latency_smoothing: 0.2,
        }
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    config: ConnectionConfig,
    state: Mutex<ConnectionState>,
    stats: Mutex<ConnectionStats>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    registry: Arc<EventRegistry>,
    state_listeners: Arc<Listeners<ConnectionState>>,
    resync_listeners: Arc<Listeners<ResyncSignal>>,
    tasks: TaskArena,
    user_closed: AtomicBool,
    epoch: AtomicU64,
}

/// # Connection Manager
///
/// Cheap to clone; clones drive the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: ConnectionConfig,
        registry: Arc<EventRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                state: Mutex::new(ConnectionState::Disconnected),
                stats: Mutex::new(ConnectionStats::default()),
                outbound: Mutex::new(None),
                registry,
                state_listeners: Listeners::new("connection_state"),
                resync_listeners: Listeners::new("resync"),
                tasks: TaskArena::new("connection"),
                user_closed: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Opens the connection. No-op while `connected` or `connecting`.
    ///
    /// A fresh connect resets the statistics. If the attempt fails the
    /// manager keeps retrying in the background; the returned state tells
    /// which way it went.
    pub async fn connect(&self) -> ConnectionState {
        {
            let mut state = self.inner.state.lock();
            if matches!(*state, ConnectionState::Connected | ConnectionState::Connecting) {
                return *state;
            }
            *state = ConnectionState::Connecting;
        }
        self.inner.announce(ConnectionState::Connecting);

        self.inner.user_closed.store(false, Ordering::SeqCst);
        self.inner.tasks.cancel(TaskKind::Reconnect);
        *self.inner.stats.lock() = ConnectionStats::default();

        self.inner.clone().open_session(false).await
    }

    /// Closes the connection on the user's behalf and suppresses automatic
    /// reconnection, including any retry already armed.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        inner.user_closed.store(true, Ordering::SeqCst);
        inner.epoch.fetch_add(1, Ordering::SeqCst);
        inner.tasks.cancel(TaskKind::Reconnect);
        inner.tasks.cancel(TaskKind::Reader);
        inner.outbound.lock().take();

        if inner.state() != ConnectionState::Disconnected {
            let mut stats = inner.stats.lock();
            stats.disconnected_at = Some(Utc::now());
            stats.next_retry_at = None;
        }
        inner.set_state(ConnectionState::Disconnected);
    }

    /// Drops the current session (if any) and attempts a new one right away,
    /// cancelling a pending retry. Statistics are kept; success resyncs.
    pub async fn reconnect(&self) -> ConnectionState {
        let inner = &self.inner;
        log::info!("Manual reconnect requested");
        inner.user_closed.store(false, Ordering::SeqCst);
        inner.epoch.fetch_add(1, Ordering::SeqCst);
        inner.tasks.cancel(TaskKind::Reconnect);
        inner.tasks.cancel(TaskKind::Reader);
        inner.outbound.lock().take();
        inner.stats.lock().next_retry_at = None;
        inner.set_state(ConnectionState::Connecting);

        inner.clone().open_session(true).await
    }

    /// Serializes `message` and sends it. Returns `false` when not connected
    /// or when the message cannot be serialized.
    pub fn send<M: Serialize>(&self, message: &M) -> bool {
        if self.state() != ConnectionState::Connected {
            log::debug!("Not connected, dropping outbound message");
            return false;
        }
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Outbound message not serializable: {}", e);
                return false;
            }
        };
        match self.inner.outbound.lock().as_ref() {
            Some(tx) => tx.send(text).is_ok(),
            None => false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// A copy of the current statistics.
    pub fn stats(&self) -> ConnectionStats {
        self.inner.stats.lock().clone()
    }

    /// The registry every parsed frame is published on.
    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.inner.registry
    }

    pub fn endpoint(&self) -> String {
        self.inner.transport.describe()
    }

    /// Registers a handler for every state transition.
    pub fn on_state_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ConnectionState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.state_listeners.add(handler)
    }

    /// Registers a handler for events of `event_type` (see [`EventRegistry::subscribe`]).
    pub fn on_event<F>(&self, event_type: &str, handler: F) -> Subscription
    where
        F: Fn(&RawEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.registry.subscribe(event_type, handler)
    }

    /// Registers a handler for successful reconnections.
    pub fn on_resync<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ResyncSignal) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.resync_listeners.add(handler)
    }

    /// Disconnects, cancels every task and drops the state and resync handlers.
    pub fn shutdown(&self) {
        self.disconnect();
        self.inner.tasks.cancel_all();
        self.inner.state_listeners.clear();
        self.inner.resync_listeners.clear();
    }
}

impl Inner {
    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = {
            let mut state = self.state.lock();
            if *state == next {
                return;
            }
            std::mem::replace(&mut *state, next)
        };
        log::info!("Connection {} -> {}", previous, next);
        self.state_listeners.emit(&next);
    }

    fn announce(&self, state: ConnectionState) {
        log::info!("Connection -> {} ({})", state, self.transport.describe());
        self.state_listeners.emit(&state);
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch && !self.user_closed.load(Ordering::SeqCst)
    }

    /// One connection attempt. Boxed because a failed attempt arms a timer
    /// whose task opens the next session.
    fn open_session(self: Arc<Self>, resync: bool) -> BoxFuture<'static, ConnectionState> {
        Box::pin(async move {
            let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            let opened = self.transport.open().await;

            if !self.is_current(epoch) {
                log::debug!("Discarding superseded connection attempt #{}", epoch);
                return self.state();
            }

            match opened {
                Ok(session) => {
                    self.on_open(epoch, session, resync);
                }
                Err(e) => {
                    log::warn!("Connection attempt to {} failed: {}", self.transport.describe(), e);
                    if self.state() == ConnectionState::Connecting {
                        self.set_state(ConnectionState::Error);
                    }
                    self.schedule_retry(epoch);
                }
            }
            self.state()
        })
    }

    fn on_open(self: &Arc<Self>, epoch: u64, session: TransportSession, resync: bool) {
        let TransportSession { outbound, inbound } = session;
        *self.outbound.lock() = Some(outbound);

        let attempts = {
            let mut stats = self.stats.lock();
            stats.connected_at = Some(Utc::now());
            stats.next_retry_at = None;
            std::mem::take(&mut stats.reconnect_attempts)
        };

        self.tasks
            .spawn(TaskKind::Reader, read_loop(Arc::downgrade(self), epoch, inbound));
        self.set_state(ConnectionState::Connected);

        if resync {
            log::info!("Reconnected after {} attempt(s), requesting resync", attempts);
            self.resync_listeners.emit(&ResyncSignal {
                attempts,
                at: Utc::now(),
            });
        }
    }

    fn on_frame(&self, text: &str) {
        let received_at = Utc::now();
        let event = match RawEvent::from_frame(text, received_at) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("Dropping malformed frame: {}", e);
                return;
            }
        };

        {
            let mut stats = self.stats.lock();
            stats.total_events_received += 1;
            stats.last_event_at = Some(received_at);
            if let Some(latency) = event.latency_ms() {
                stats.record_latency(latency, self.config.latency_smoothing);
            }
        }
        self.registry.publish(&event);
    }

    fn on_session_end(self: &Arc<Self>, epoch: u64, error: Option<TransportError>) {
        if !self.is_current(epoch) {
            return;
        }
        self.outbound.lock().take();
        self.stats.lock().disconnected_at = Some(Utc::now());

        match error {
            Some(e) => {
                log::error!("Connection to {} lost: {}", self.transport.describe(), e);
                self.set_state(ConnectionState::Error);
            }
            None => log::warn!("Connection to {} closed by server", self.transport.describe()),
        }
        self.schedule_retry(epoch);
    }

    fn schedule_retry(self: &Arc<Self>, epoch: u64) {
        if self.user_closed.load(Ordering::SeqCst) {
            return;
        }

        let (attempt, delay) = {
            let mut stats = self.stats.lock();
            stats.reconnect_attempts += 1;
            let attempt = stats.reconnect_attempts;
            let delay = self.config.backoff.delay_for(attempt);
            stats.next_retry_at = chrono::Duration::from_std(delay)
                .ok()
                .map(|d| Utc::now() + d);
            (attempt, delay)
        };

        self.set_state(ConnectionState::Reconnecting);
        log::info!("Reconnect attempt {} in {:?}", attempt, delay);

        let weak = Arc::downgrade(self);
        self.tasks.schedule(TaskKind::Reconnect, delay, async move {
            let Some(inner) = weak.upgrade() else { return };
            if inner.epoch.load(Ordering::SeqCst) != epoch || inner.user_closed.load(Ordering::SeqCst) {
                return;
            }
            inner.stats.lock().next_retry_at = None;
            inner.open_session(true).await;
        });
    }
}

async fn read_loop(
    weak: Weak<Inner>,
    epoch: u64,
    mut inbound: mpsc::UnboundedReceiver<Result<String, TransportError>>,
) {
    let ended = loop {
        match inbound.recv().await {
            Some(Ok(text)) => match weak.upgrade() {
                Some(inner) => inner.on_frame(&text),
                None => return,
            },
            Some(Err(e)) => break Some(e),
            None => break None,
        }
    };
    if let Some(inner) = weak.upgrade() {
        inner.on_session_end(epoch, ended);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelTransport, ServerEnd};
    use serde_json::json;
    use std::time::Duration;

    const BASE: Duration = Duration::from_millis(100);

    struct Harness {
        manager: ConnectionManager,
        transport: ChannelTransport,
        accepted: mpsc::UnboundedReceiver<ServerEnd>,
        states: Arc<Mutex<Vec<ConnectionState>>>,
        resyncs: Arc<Mutex<Vec<ResyncSignal>>>,
    }

    fn harness() -> Harness {
        let (transport, accepted) = ChannelTransport::new();
        let config = ConnectionConfig {
            backoff: BackoffPolicy {
                base_delay: BASE,
                max_delay: Duration::from_secs(2),
                jitter_ratio: 0.0,
            },
            latency_smoothing: 0.2,
        };
        let manager = ConnectionManager::new(
            Arc::new(transport.clone()),
            config,
            Arc::new(EventRegistry::default()),
        );

        let states = Arc::new(Mutex::new(Vec::new()));
        let s = states.clone();
        let _ = manager.on_state_change(move |state| {
            s.lock().push(*state);
            Ok(())
        });
        let resyncs = Arc::new(Mutex::new(Vec::new()));
        let r = resyncs.clone();
        let _ = manager.on_resync(move |signal| {
            r.lock().push(signal.clone());
            Ok(())
        });

        Harness {
            manager,
            transport,
            accepted,
            states,
            resyncs,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_idempotent_while_connected() {
        let mut h = harness();
        assert_eq!(h.manager.connect().await, ConnectionState::Connected);
        let _server = h.accepted.recv().await.unwrap();
        assert_eq!(h.manager.connect().await, ConnectionState::Connected);

        assert_eq!(h.transport.sessions_opened(), 1);
        let stats = h.manager.stats();
        assert!(stats.connected_at.is_some());
        assert_eq!(stats.reconnect_attempts, 0);
        assert_eq!(
            *h.states.lock(),
            vec![ConnectionState::Connecting, ConnectionState::Connected]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn frames_are_counted_and_published() {
        let mut h = harness();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let _ = h.manager.on_event("guardian_update", move |e| {
            s.lock().push(e.data["score"].as_f64().unwrap_or_default());
            Ok(())
        });

        h.manager.connect().await;
        let server = h.accepted.recv().await.unwrap();
        server.push_json(&json!({"type": "guardian_update", "data": {"score": 0.8}}));
        server.push_frame("{not json");
        server.push_json(&json!({"type": "heartbeat", "data": null}));
        settle().await;

        assert_eq!(*seen.lock(), vec![0.8]);
        let stats = h.manager.stats();
        assert_eq!(stats.total_events_received, 2);
        assert!(stats.last_event_at.is_some());
        assert_eq!(stats.latency_samples, 0);
        assert_eq!(h.manager.registry().recent_events(10).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn server_timestamps_feed_latency_average() {
        let mut h = harness();
        h.manager.connect().await;
        let server = h.accepted.recv().await.unwrap();
        let sent = (Utc::now() - chrono::Duration::milliseconds(250)).to_rfc3339();
        server.push_json(&json!({"type": "system_health", "data": {}, "timestamp": sent}));
        settle().await;

        let stats = h.manager.stats();
        assert_eq!(stats.latency_samples, 1);
        assert!(stats.average_latency >= 250.0, "{}", stats.average_latency);
    }

    #[test]
    fn latency_average_is_exponentially_weighted() {
        let mut stats = ConnectionStats::default();
        stats.record_latency(100.0, 0.2);
        assert_eq!(stats.average_latency, 100.0);
        stats.record_latency(200.0, 0.2);
        assert!((stats.average_latency - 120.0).abs() < 1e-9);
        stats.record_latency(-50.0, 0.2);
        assert!((stats.average_latency - 96.0).abs() < 1e-9);
        assert_eq!(stats.latency_samples, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_close_reconnects_and_resyncs() {
        let mut h = harness();
        h.manager.connect().await;
        let server = h.accepted.recv().await.unwrap();

        drop(server);
        settle().await;
        assert_eq!(h.manager.state(), ConnectionState::Reconnecting);
        let stats = h.manager.stats();
        assert_eq!(stats.reconnect_attempts, 1);
        assert!(stats.next_retry_at.is_some());
        assert!(stats.disconnected_at.is_some());

        tokio::time::sleep(BASE).await;
        let _second = h.accepted.recv().await.unwrap();
        assert_eq!(h.manager.state(), ConnectionState::Connected);
        let stats = h.manager.stats();
        assert_eq!(stats.reconnect_attempts, 0);
        assert!(stats.next_retry_at.is_none());
        assert_eq!(h.resyncs.lock().len(), 1);
        assert_eq!(h.resyncs.lock()[0].attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_back_off_while_refused() {
        let mut h = harness();
        h.manager.connect().await;
        let server = h.accepted.recv().await.unwrap();
        h.transport.set_refuse(true);
        drop(server);

        // Attempts at 100ms and 300ms fail, the third is due at 700ms
        tokio::time::sleep(Duration::from_millis(650)).await;
        assert_eq!(h.manager.stats().reconnect_attempts, 3);
        assert_eq!(h.manager.state(), ConnectionState::Reconnecting);

        h.transport.set_refuse(false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.accepted.try_recv().is_ok());
        assert_eq!(h.manager.state(), ConnectionState::Connected);
        assert_eq!(h.manager.stats().reconnect_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_retry() {
        let mut h = harness();
        h.manager.connect().await;
        drop(h.accepted.recv().await);
        settle().await;
        assert_eq!(h.manager.state(), ConnectionState::Reconnecting);

        h.manager.disconnect();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(h.manager.state(), ConnectionState::Disconnected);
        assert_eq!(h.transport.sessions_opened(), 1);
        assert!(h.manager.stats().next_retry_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn user_disconnect_does_not_reconnect() {
        let mut h = harness();
        h.manager.connect().await;
        let mut server = h.accepted.recv().await.unwrap();

        h.manager.disconnect();
        assert!(server.recv().await.is_none());
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(h.manager.state(), ConnectionState::Disconnected);
        assert_eq!(h.transport.sessions_opened(), 1);
        assert!(h.manager.stats().disconnected_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn send_requires_a_connection() {
        let mut h = harness();
        assert!(!h.manager.send(&json!({"type": "ping"})));

        h.manager.connect().await;
        let mut server = h.accepted.recv().await.unwrap();
        assert!(h.manager.send(&json!({"type": "ping"})));
        let text = server.recv().await.unwrap();
        assert_eq!(serde_json::from_str::<serde_json::Value>(&text).unwrap()["type"], "ping");
    }

    #[tokio::test(start_paused = true)]
    async fn socket_error_surfaces_before_reconnecting() {
        let mut h = harness();
        h.manager.connect().await;
        h.accepted.recv().await.unwrap().fail("connection reset");
        settle().await;

        assert_eq!(
            *h.states.lock(),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Error,
                ConnectionState::Reconnecting,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_first_connect_enters_retry_loop() {
        let mut h = harness();
        h.transport.set_refuse(true);
        assert_eq!(h.manager.connect().await, ConnectionState::Reconnecting);
        assert_eq!(h.manager.stats().reconnect_attempts, 1);

        h.transport.set_refuse(false);
        tokio::time::sleep(BASE + Duration::from_millis(1)).await;
        assert!(h.accepted.try_recv().is_ok());
        assert_eq!(h.manager.state(), ConnectionState::Connected);
        assert_eq!(
            h.states.lock()[..3],
            [
                ConnectionState::Connecting,
                ConnectionState::Error,
                ConnectionState::Reconnecting
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stats_survive_reconnects_but_not_fresh_connects() {
        let mut h = harness();
        h.manager.connect().await;
        let server = h.accepted.recv().await.unwrap();
        server.push_json(&json!({"type": "tick", "data": 1}));
        settle().await;
        drop(server);

        tokio::time::sleep(BASE * 2).await;
        let _second = h.accepted.recv().await.unwrap();
        assert_eq!(h.manager.stats().total_events_received, 1);

        h.manager.disconnect();
        h.manager.connect().await;
        let _third = h.accepted.recv().await.unwrap();
        assert_eq!(h.manager.stats().total_events_received, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_reconnect_replaces_session_and_resyncs() {
        let mut h = harness();
        h.manager.connect().await;
        let mut first = h.accepted.recv().await.unwrap();

        assert_eq!(h.manager.reconnect().await, ConnectionState::Connected);
        assert!(first.recv().await.is_none());
        let second = h.accepted.recv().await.unwrap();
        assert_eq!(second.session, 2);
        assert_eq!(h.resyncs.lock().len(), 1);

        // The old session ending must not trigger a retry
        drop(first);
        settle().await;
        assert_eq!(h.manager.state(), ConnectionState::Connected);
    }
}
