use cosmic_core::transport::WsTransport;
use cosmic_core::{ConnectionState, GuardianType, SyncConfig, SyncEngine};
use project_tests::{wait_for, BrainServer};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn fast_config() -> SyncConfig {
    SyncConfig {
        base_delay_ms: 50,
        max_delay_ms: 500,
        jitter_ratio: 0.0,
        batch_window_ms: 20,
        ..SyncConfig::default()
    }
}

#[tokio::test]
async fn test_guardian_update_reaches_snapshot() {
    let mut server = BrainServer::start().await.expect("Failed to start test server");
    let transport = WsTransport::new(&server.url()).expect("Invalid test server URL");
    let engine = SyncEngine::init(fast_config(), Arc::new(transport)).expect("Invalid config");

    assert_eq!(engine.connect().await, ConnectionState::Connected);
    let session = server.next_session(WAIT).await.expect("Client never connected");

    session.send_json(&json!({
        "type": "guardian_analysis_complete",
        "data": {"guardianType": "architecture", "score": 0.8, "recommendations": ["split modules"]},
        "timestamp": epoch_millis_now(),
    }));
    session.send_json(&json!({
        "type": "philosophy_update",
        "data": {"overallScore": 0.7, "principles": {"bienComun": 0.75}}
    }));

    assert!(
        wait_for(WAIT, || engine.snapshot().update_count >= 1).await,
        "Snapshot never updated"
    );
    assert!(wait_for(WAIT, || engine.snapshot().system_health.philosophy_alignment > 0.0).await);

    let snapshot = engine.snapshot();
    let report = snapshot.report(GuardianType::Architecture).expect("Missing report");
    assert_eq!(report.score, 0.8);
    assert_eq!(snapshot.system_health.total_recommendations, 1);
    assert!(!snapshot.is_stale);

    let stats = engine.stats();
    assert_eq!(stats.total_events_received, 2);
    assert_eq!(stats.latency_samples, 1);
    assert_eq!(engine.recent_events(10).len(), 2);

    engine.teardown();
}

#[tokio::test]
async fn test_outbound_messages_reach_server() {
    let mut server = BrainServer::start().await.expect("Failed to start test server");
    let transport = WsTransport::new(&server.url()).expect("Invalid test server URL");
    let engine = SyncEngine::init(fast_config(), Arc::new(transport)).expect("Invalid config");

    engine.connect().await;
    let mut session = server.next_session(WAIT).await.expect("Client never connected");

    assert!(engine.trigger_guardian_action(GuardianType::Performance, "analyze"));
    let frame = session.recv(WAIT).await.expect("No outbound frame");
    let value: serde_json::Value = serde_json::from_str(&frame).expect("Outbound frame is not JSON");
    assert_eq!(value["type"], "trigger_guardian_action");
    assert_eq!(value["data"]["guardianType"], "performance");

    engine.disconnect();
    assert!(session.recv(WAIT).await.is_none(), "Socket stayed open after disconnect");
    assert!(!engine.request_full_update("after disconnect"));

    engine.teardown();
}

fn epoch_millis_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
