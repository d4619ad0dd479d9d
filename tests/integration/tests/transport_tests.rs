//! End-to-end transport tests against the in-process mock platform.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use arena_core::ChannelName;
use arena_transport::{
    EndpointConfig, NotificationHub, NotificationSink, SessionConfig, SessionState,
};
use integration_tests::{wait_for, MockOptions, MockPlatform};

type Collected = Arc<Mutex<Vec<(String, Value, bool)>>>;

fn endpoint(mock: &MockPlatform) -> EndpointConfig {
    EndpointConfig::new(mock.base_url(), "r")
}

fn fast_config(mock: &MockPlatform) -> SessionConfig {
    let mut config = SessionConfig::new(endpoint(mock));
    config.reconnect_delay = Duration::from_millis(100);
    config.probe_timeout = Duration::from_secs(2);
    config
}

fn collecting_sink() -> (NotificationSink, Collected) {
    let collected: Collected = Arc::new(Mutex::new(Vec::new()));
    let sink: NotificationSink = {
        let collected = Arc::clone(&collected);
        Arc::new(move |channel, payload, live| {
            collected.lock().push((channel.to_string(), payload, live));
        })
    };
    (sink, collected)
}

#[tokio::test]
async fn test_handshake_probe_upgrade_and_heartbeat() {
    let mock = MockPlatform::start_with(MockOptions {
        ping_interval_ms: 100,
        drop_first_connection: false,
    })
    .await
    .unwrap();

    let hub = NotificationHub::new();
    let (sink, _) = collecting_sink();
    let session = hub.create_session(fast_config(&mock).with_auto_restart(false), sink);

    assert!(
        wait_for(Duration::from_secs(5), || session.state()
            == SessionState::Connected)
        .await,
        "session never connected"
    );
    assert_eq!(mock.state.handshake_count(), 1);

    // Heartbeats only start after the probe/upgrade exchange.
    assert!(
        wait_for(Duration::from_secs(5), || mock.state.heartbeat_count() >= 2).await,
        "no heartbeats observed"
    );

    hub.cleanup().await;
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_preconnect_channels_replayed_with_canonical_encoding() {
    let mock = MockPlatform::start().await.unwrap();

    let mut config = fast_config(&mock).with_auto_restart(false);
    config.initial_channels = HashSet::from([ChannelName::new("/table/t5")]);

    let hub = NotificationHub::new();
    let (sink, _) = collecting_sink();
    let session = hub.create_session(config, sink);

    assert!(
        wait_for(Duration::from_secs(5), || !mock
            .state
            .subscribed_channels()
            .is_empty())
        .await,
        "join never posted"
    );
    assert_eq!(mock.state.subscribed_channels(), vec!["/table/t5"]);
    assert_eq!(
        mock.state.subscribe_bodies(),
        vec![r#"22:42["join","/table/t5"]"#.to_string()]
    );

    hub.close_session(&session).await;
}

#[tokio::test]
async fn test_subscribe_after_connect_posts_join() {
    let mock = MockPlatform::start().await.unwrap();
    let hub = NotificationHub::new();
    let (sink, _) = collecting_sink();
    let session = hub.create_session(fast_config(&mock).with_auto_restart(false), sink);

    assert!(
        wait_for(Duration::from_secs(5), || session.state()
            == SessionState::Connected)
        .await
    );

    let channel = ChannelName::new("/table/t226845327");
    session.subscribe(&[channel.clone()]).await.unwrap();

    assert!(
        wait_for(Duration::from_secs(5), || mock
            .state
            .subscribed_channels()
            .contains(&"/table/t226845327".to_string()))
        .await,
        "join not recorded"
    );

    hub.cleanup().await;
}

#[tokio::test]
async fn test_reconnect_repeats_handshake_and_resubscribes() {
    let mock = MockPlatform::start_with(MockOptions {
        ping_interval_ms: 25_000,
        drop_first_connection: true,
    })
    .await
    .unwrap();

    let mut config = fast_config(&mock);
    config.initial_channels = HashSet::from([ChannelName::new("/table/t9")]);

    let hub = NotificationHub::new();
    let (sink, _) = collecting_sink();
    let session = hub.create_session(config, sink);

    // First connection is dropped by the server right after the upgrade;
    // the session must come back on its own and join again.
    assert!(
        wait_for(Duration::from_secs(10), || mock.state.handshake_count() >= 2).await,
        "second handshake never happened"
    );
    assert!(
        wait_for(Duration::from_secs(10), || mock
            .state
            .subscribed_channels()
            .len()
            >= 2)
        .await,
        "channel not re-joined after reconnect"
    );
    assert!(
        wait_for(Duration::from_secs(5), || session.state()
            == SessionState::Connected)
        .await
    );

    hub.cleanup().await;
}

#[tokio::test]
async fn test_live_notifications_reach_sink_in_order() {
    let mock = MockPlatform::start().await.unwrap();
    let hub = NotificationHub::new();
    let (sink, collected) = collecting_sink();
    let session = hub.create_session(fast_config(&mock).with_auto_restart(false), sink);

    assert!(
        wait_for(Duration::from_secs(5), || session.state()
            == SessionState::Connected)
        .await
    );

    mock.send_notification(
        "/table/t7",
        1,
        json!([{"type": "gameStateChange", "args": {"id": 3}}]),
    );
    mock.send_notification(
        "/table/t7",
        2,
        json!([{"type": "finalScore", "args": {}}]),
    );

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while collected.lock().len() < 2 && tokio::time::Instant::now() < deadline {
        hub.dispatch(true, Some(Duration::from_millis(200))).await;
    }

    let entries = collected.lock().clone();
    assert_eq!(entries.len(), 2, "notifications missing: {entries:?}");
    assert_eq!(entries[0].0, "/table/t7");
    assert!(entries[0].2, "delivery should be live");
    assert_eq!(entries[0].1["packet_id"], 1);
    assert_eq!(entries[1].1["packet_id"], 2);

    hub.cleanup().await;
}
