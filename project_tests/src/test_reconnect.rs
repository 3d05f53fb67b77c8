use cosmic_core::transport::WsTransport;
use cosmic_core::{ConnectionState, GuardianType, SyncConfig, SyncEngine};
use project_tests::{wait_for, BrainServer};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_server_close_triggers_reconnect_and_resync() {
    let mut server = BrainServer::start().await.expect("Failed to start test server");
    let transport = WsTransport::new(&server.url()).expect("Invalid test server URL");
    let config = SyncConfig {
        base_delay_ms: 100,
        max_delay_ms: 1_000,
        jitter_ratio: 0.0,
        batch_window_ms: 20,
        ..SyncConfig::default()
    };
    let engine = SyncEngine::init(config, Arc::new(transport)).expect("Invalid config");

    let states = Arc::new(Mutex::new(Vec::new()));
    let recorded = states.clone();
    let _sub = engine.on_state_change(move |state| {
        recorded.lock().unwrap().push(*state);
        Ok(())
    });

    engine.connect().await;
    let first = server.next_session(WAIT).await.expect("Client never connected");
    first.close();

    let mut second = server.next_session(WAIT).await.expect("Client never reconnected");
    assert!(wait_for(WAIT, || engine.state() == ConnectionState::Connected).await);
    assert_eq!(engine.stats().reconnect_attempts, 0);
    assert!(states.lock().unwrap().contains(&ConnectionState::Reconnecting));

    // The first frame on the new session asks for a full snapshot
    let request = second.recv(WAIT).await.expect("No resync request");
    let value: serde_json::Value = serde_json::from_str(&request).expect("Request is not JSON");
    assert_eq!(value["type"], "request_full_update");

    second.send_json(&json!({
        "type": "full_update",
        "data": {
            "guardians": {
                "ux": {"guardianType": "ux", "score": 0.9},
                "performance": {"guardianType": "performance", "score": 0.7}
            }
        }
    }));
    assert!(wait_for(WAIT, || engine.snapshot().guardian_reports.len() == 2).await);
    let snapshot = engine.snapshot();
    assert!((snapshot.system_health.overall_score - 0.8).abs() < 1e-9);
    assert_eq!(snapshot.report(GuardianType::Ux).map(|r| r.score), Some(0.9));

    engine.disconnect();
    assert!(second.recv(WAIT).await.is_none());
    assert!(server.next_session(Duration::from_millis(500)).await.is_none());
    assert_eq!(engine.state(), ConnectionState::Disconnected);

    engine.teardown();
}

#[tokio::test]
async fn test_unreachable_server_keeps_retrying() {
    // Bind and drop a listener to get a port nobody serves
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("Bind failed");
        listener.local_addr().expect("No local addr").port()
    };
    let transport = WsTransport::new(&format!("ws://127.0.0.1:{}/ws", port)).expect("Invalid URL");
    let config = SyncConfig {
        base_delay_ms: 20,
        max_delay_ms: 80,
        jitter_ratio: 0.0,
        ..SyncConfig::default()
    };
    let engine = SyncEngine::init(config, Arc::new(transport)).expect("Invalid config");

    assert_eq!(engine.connect().await, ConnectionState::Reconnecting);
    assert!(wait_for(WAIT, || engine.stats().reconnect_attempts >= 3).await);
    assert!(engine.stats().next_retry_at.is_some() || engine.state() == ConnectionState::Reconnecting);

    engine.disconnect();
    let attempts = engine.stats().reconnect_attempts;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(engine.stats().reconnect_attempts, attempts);
    assert_eq!(engine.state(), ConnectionState::Disconnected);

    engine.teardown();
}
