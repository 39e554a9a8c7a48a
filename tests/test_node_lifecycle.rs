//! Node lifecycle tests
//!
//! Tests initialization, reconnect policy, resets, manual disconnect, the
//! connectivity self-test, diagnostics and runtime tunables.


use fieldnode::clock::Clock;
use fieldnode::config::ConfigError;
use fieldnode::error::ErrorKind;
use fieldnode::node::{FieldNode, NodePorts};
use fieldnode::status::NodeStatus;
use fieldnode::testing::{FixedProbe, MemorySink, MockClock, MockHttpTransport, MockLink};
use serde_json::{json, Value};
use std::net::Ipv4Addr;
use std::sync::Arc;
use test_helpers::{connected, harness, harness_with, test_config};

fn bare_node() -> (FieldNode, MockHttpTransport) {
    let clock = MockClock::new();
    let http = MockHttpTransport::new();
    let node = FieldNode::new(NodePorts {
        link: Box::new(MockLink::new(clock.clone())),
        http: Arc::new(http.clone()),
        clock: Arc::new(clock),
        sink: Arc::new(MemorySink::new()),
        probe: Arc::new(FixedProbe::default()),
    });
    (node, http)
}

#[tokio::test]
async fn test_uninitialized_node_refuses_work() {
    let (mut node, http) = bare_node();

    assert!(!node.is_initialized());
    assert!(!node.connect().await);
    let response = node.publish_sensors(20.0, 50.0, -1.0, -1.0).await;
    assert_eq!(response.error_kind, ErrorKind::NotInitialized);
    assert_eq!(
        node.publish_raw(r#"{"payload":{}}"#).await.error_kind,
        ErrorKind::NotInitialized
    );
    assert!(!node.test_connection().await);
    node.tick().await;
    assert_eq!(http.request_count(), 0);
    assert_eq!(node.status(), NodeStatus::Disconnected);
}

#[tokio::test]
async fn test_init_rejects_missing_field_without_state_change() {
    let (mut node, _http) = bare_node();
    let err = node
        .init(fieldnode::NodeConfig::new("home", "pw", "", "https://ex.test", "probe"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::MissingField("platform.api_key")));
    assert!(!node.is_initialized());
}

#[tokio::test]
async fn test_init_normalizes_base_url_and_device_name() {
    let (mut node, http) = bare_node();
    node.init(fieldnode::NodeConfig::new("home", "pw", "k", "https://ex.test///", ""))
        .unwrap();
    assert!(node.connect().await);
    node.publish_sensors(20.0, 50.0, -1.0, -1.0).await;

    let request = &http.requests()[0];
    assert_eq!(request.url, "https://ex.test/api/ingest");
    assert!(request.body.contains(r#""device_name":"ESP32-Device""#));
}

#[tokio::test]
async fn test_status_string_follows_lifecycle() {
    let mut h = harness(test_config(), 201);
    assert_eq!(h.node.status_string(), "Disconnected");
    h.node.connect().await;
    assert_eq!(h.node.status_string(), "WiFi Connected");
    h.node.publish_sensors(20.0, 50.0, -1.0, -1.0).await;
    assert_eq!(h.node.status_string(), "Platform Connected");
    h.node.disconnect();
    assert_eq!(h.node.status_string(), "Disconnected");
}

#[tokio::test]
async fn test_connect_timeout_faults_node() {
    let mut h = harness_with(
        test_config().with_connection_timeout_ms(2_000),
        None,
        MockHttpTransport::new(),
    );
    assert!(!h.node.connect().await);
    assert_eq!(h.node.status_string(), "Error");
    assert_eq!(h.clock.now_ms(), 2_000);
    assert_eq!(h.node.health().consecutive_failures, 1);
}

#[tokio::test]
async fn test_faulted_node_reset_returns_to_disconnected() {
    let mut h = harness_with(
        test_config()
            .with_connection_timeout_ms(1_000)
            .with_max_consecutive_failures(1),
        None,
        MockHttpTransport::new(),
    );
    assert!(!h.node.connect().await);
    assert_eq!(h.node.reset_count(), 1);
    assert_eq!(h.node.status(), NodeStatus::Disconnected);
    assert_eq!(h.node.health().consecutive_failures, 0);
}

#[tokio::test]
async fn test_tick_reconnects_after_cooldown() {
    let mut h = connected(test_config(), 200).await;
    h.link.drop_link();

    h.clock.advance(10_000);
    h.node.tick().await;
    assert_eq!(h.node.status(), NodeStatus::Disconnected);
    assert_eq!(h.link.begin_count(), 1);

    h.clock.advance(20_000);
    h.node.tick().await;
    assert_eq!(h.link.begin_count(), 2);
    assert_eq!(h.node.status(), NodeStatus::LinkUp);
}

#[tokio::test]
async fn test_failures_stretch_reconnect_cooldown() {
    let mut h = connected(test_config().with_retry(1, 0), 500).await;
    h.node.publish_sensors(20.0, 50.0, -1.0, -1.0).await;
    h.node.publish_sensors(20.0, 50.0, -1.0, -1.0).await;
    h.link.drop_link();

    // two failures: cooldown is 50 s from the connect at t=0
    h.clock.set(45_000);
    h.node.tick().await;
    assert_eq!(h.link.begin_count(), 1);

    h.clock.set(50_000);
    h.node.tick().await;
    assert_eq!(h.link.begin_count(), 2);
}

#[tokio::test]
async fn test_auto_reconnect_disabled() {
    let mut h = connected(test_config(), 200).await;
    h.node.set_auto_reconnect(false);
    h.link.drop_link();
    h.clock.advance(120_000);
    h.node.tick().await;
    assert_eq!(h.link.begin_count(), 1);
    assert_eq!(h.node.status(), NodeStatus::Disconnected);
}

#[tokio::test]
async fn test_manual_disconnect_suppresses_reconnect() {
    let mut h = connected(test_config(), 200).await;
    h.node.disconnect();
    assert_eq!(h.link.tear_down_count(), 1);

    h.clock.advance(120_000);
    h.node.tick().await;
    assert_eq!(h.link.begin_count(), 1);

    assert!(h.node.connect().await);
    assert_eq!(h.node.status(), NodeStatus::LinkUp);
}

#[tokio::test]
async fn test_stale_platform_demoted_to_link_up() {
    let config = test_config()
        .with_heartbeat_interval_ms(1_000)
        .with_retry(1, 0);
    let http = MockHttpTransport::new().with_default_reply(500, "");
    http.push_reply(200, "");
    let mut h = harness_with(config, Some(0), http);
    h.node.connect().await;
    h.node.publish_sensors(20.0, 50.0, -1.0, -1.0).await;
    assert_eq!(h.node.status(), NodeStatus::PlatformConfirmed);

    h.clock.advance(2_000);
    h.node.tick().await;
    assert_eq!(h.node.status(), NodeStatus::LinkUp);
    assert!(!h.node.is_platform_active());
    assert_eq!(h.http.request_count(), 2, "heartbeat attempted after demotion");
}

#[tokio::test]
async fn test_connectivity_test_passes_and_clears_errors() {
    let mut h = connected(test_config().with_retry(1, 0), 200).await;
    h.http.push_reply(500, "");
    h.node.publish_sensors(20.0, 50.0, -1.0, -1.0).await;
    assert_eq!(h.node.health().consecutive_failures, 1);

    assert!(h.node.run_connectivity_test().await);
    assert_eq!(h.node.last_error(), "No errors recorded");
    assert_eq!(h.node.status(), NodeStatus::PlatformConfirmed);

    let frame = h.http.requests().pop().unwrap();
    let body: Value = serde_json::from_str(&frame.body).unwrap();
    assert_eq!(body["payload"]["test"], true);
    assert_eq!(body["payload"]["device"], "probe");
    assert_eq!(frame.timeout.as_millis(), 5_000);
}

#[tokio::test]
async fn test_connectivity_test_short_circuits() {
    let mut down = harness(test_config(), 200);
    assert!(!down.node.run_connectivity_test().await);
    assert_eq!(down.http.request_count(), 0);

    let clock = MockClock::new();
    let http = MockHttpTransport::new();
    let mut node = FieldNode::new(NodePorts {
        link: Box::new(MockLink::new(clock.clone()).with_gateway(Ipv4Addr::UNSPECIFIED)),
        http: Arc::new(http.clone()),
        clock: Arc::new(clock),
        sink: Arc::new(MemorySink::new()),
        probe: Arc::new(FixedProbe::default()),
    });
    node.init(test_config()).unwrap();
    assert!(node.connect().await);
    assert!(!node.run_connectivity_test().await);
    assert_eq!(http.request_count(), 0);
}

#[tokio::test]
async fn test_platform_unreachable_fails_self_test() {
    let mut h = connected(test_config(), 503).await;
    assert!(!h.node.run_connectivity_test().await);
    // latency-critical profile: two attempts
    assert_eq!(h.http.request_count(), 2);
    assert_eq!(h.node.health().consecutive_failures, 1);
}

#[tokio::test]
async fn test_force_heartbeat_frame() {
    let mut h = connected(test_config(), 200).await;
    h.clock.advance(65_000);
    let response = h.node.force_heartbeat().await;
    assert!(response.ok);

    let body: Value = serde_json::from_str(&h.http.bodies()[0]).unwrap();
    let payload = &body["payload"];
    assert_eq!(payload["heartbeat"], true);
    assert_eq!(payload["timestamp"], 65_000);
    assert_eq!(payload["device_name"], "probe");
    assert_eq!(payload["signal_strength"], -61);
    assert_eq!(payload["free_memory"], 180_000);
    assert_eq!(payload["uptime"], 65);
    assert_eq!(h.node.last_heartbeat(), Some(65_000));
}

#[tokio::test]
async fn test_publish_json_wraps_objects_only() {
    let mut h = connected(test_config(), 200).await;
    let response = h.node.publish_json(&json!({"co2": 410})).await;
    assert!(response.ok);
    assert_eq!(h.http.bodies()[0], r#"{"payload":{"co2":410}}"#);

    let rejected = h.node.publish_json(&json!([1, 2, 3])).await;
    assert_eq!(rejected.error_kind, ErrorKind::InvalidPayload);
    assert_eq!(h.http.request_count(), 1);
}

#[tokio::test]
async fn test_link_accessors() {
    let mut h = harness(test_config(), 200);
    assert_eq!(h.node.signal_strength(), -999);
    assert_eq!(h.node.ip_address().to_string(), "0.0.0.0");

    h.node.connect().await;
    assert_eq!(h.node.signal_strength(), -61);
    assert_eq!(h.node.ip_address(), Ipv4Addr::new(192, 168, 1, 20));
    assert_eq!(h.node.mac_address(), "24:6F:28:AA:BB:CC");
}

#[tokio::test]
async fn test_diagnostics_snapshot() {
    let mut h = connected(test_config().with_retry(1, 0), 503).await;
    h.clock.advance(7_000);
    h.node.publish_sensors(20.0, 50.0, -1.0, -1.0).await;
    h.clock.advance(3_000);

    let diag = h.node.diagnostics();
    assert_eq!(diag.status, NodeStatus::LinkUp);
    assert_eq!(diag.consecutive_failures, 1);
    assert_eq!(diag.max_consecutive_failures, 5);
    assert_eq!(diag.uptime_seconds, 10);
    assert_eq!(diag.endpoint, "https://ex.test/api/ingest");
    assert!(diag.link.is_some());
    assert_eq!(diag.last_error.as_ref().map(|e| e.age_seconds), Some(3));

    let text = h.node.diagnostics_text();
    assert!(text.contains("Status: WiFi Connected"));
    assert!(text.contains("Consecutive Failures: 1/5"));
    assert!(text.contains("SSID: home"));
    assert!(text.contains("Last Error: service unavailable - all retries exhausted"));

    let status = h.node.detailed_status();
    assert_eq!(status["status"], "WiFi Connected");
    assert_eq!(status["wifi_connected"], true);
    assert_eq!(status["ip_address"], "192.168.1.20");
    assert_eq!(status["max_failures"], 5);
    assert_eq!(status["error_time"], 7_000);
    assert_eq!(h.node.diagnostics().to_json()["link"]["ssid"], "home");
}

#[tokio::test]
async fn test_runtime_tunables() {
    let mut h = connected(test_config(), 500).await;

    h.node.set_retry_config(1, 0);
    h.node.publish_sensors(20.0, 50.0, -1.0, -1.0).await;
    assert_eq!(h.http.request_count(), 1);

    h.node.set_max_consecutive_failures(2);
    h.node.publish_sensors(20.0, 50.0, -1.0, -1.0).await;
    assert_eq!(h.node.reset_count(), 1);

    h.node.set_heartbeat_interval(0);
    h.node.set_connection_timeout(500);
    assert!(h.node.connect().await);
    h.http.clear_history();
    h.node.tick().await;
    assert_eq!(h.http.request_count(), 1);
    assert_eq!(
        h.node.config().map(|c| c.wifi.connection_timeout_ms),
        Some(500)
    );
}

#[tokio::test]
async fn test_every_setter_reports_on_debug_sink() {
    let mut h = connected(test_config(), 200).await;
    h.node.set_debug(true);
    h.node.set_connection_timeout(12_000);
    h.node.set_retry_config(4, 250);
    h.node.set_heartbeat_interval(60_000);
    h.node.set_auto_reconnect(false);
    h.node.set_max_consecutive_failures(7);

    for expected in [
        "Debug mode enabled",
        "Connection timeout set to 12000ms",
        "Retry config: 4 attempts, 250ms base delay",
        "Heartbeat interval set to 60000ms",
        "Auto-reconnect disabled",
        "Max consecutive failures set to 7",
    ] {
        assert!(h.sink.contains(expected), "missing line: {expected}");
    }

    let before = h.sink.call_count();
    h.node.set_debug(false);
    h.node.set_heartbeat_interval(1_000);
    assert_eq!(h.sink.call_count(), before);
}

#[tokio::test]
async fn test_dropping_node_tears_down_link() {
    let h = connected(test_config(), 200).await;
    let link = h.link.clone();
    drop(h);
    assert_eq!(link.tear_down_count(), 1);
}
