//! The node: one instance composing link control, publishing, heartbeats,
//! health tracking and status projection
//!
//! The caller owns a [`FieldNode`], calls [`FieldNode::init`] once, then
//! [`FieldNode::connect`], and drives background work by calling
//! [`FieldNode::tick`] periodically. Every mutating operation takes
//! `&mut self`, so calls are serialized by construction.

use crate::clock::{Clock, HostProbe, SystemProbe, TokioClock};
use crate::config::{ConfigError, NodeConfig};
use crate::error::PublishError;
use crate::health::{FailureVerdict, HealthRecord, HealthTracker};
use crate::heartbeat::HeartbeatScheduler;
use crate::link::{LinkController, ReconnectDecision};
use crate::observability::{ConsoleSink, DebugLog, DebugSink, TracingSink};
use crate::publish::payload::{self, encode, PayloadKind, SensorFrame, SensorReadings, TestFrame};
use crate::publish::{PublishEngine, Response, RetryPolicy};
use crate::status::{Diagnostics, ErrorSnapshot, NodeStatus, StatusEvent, StatusProjection};
use crate::transport::host::HostLink;
use crate::transport::http::ReqwestTransport;
use crate::transport::{HttpTransport, Link};
use serde_json::{json, Value};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Platform collaborators handed to a node
pub struct NodePorts {
    pub link: Box<dyn Link>,
    pub http: Arc<dyn HttpTransport>,
    pub clock: Arc<dyn Clock>,
    pub sink: Arc<dyn DebugSink>,
    pub probe: Arc<dyn SystemProbe>,
}

impl NodePorts {
    /// Ports for running on a Linux host
    ///
    /// With `console` set, debug lines go to stdout instead of `tracing`.
    pub fn host(console: bool) -> Result<Self, reqwest::Error> {
        let sink: Arc<dyn DebugSink> = if console {
            Arc::new(ConsoleSink)
        } else {
            Arc::new(TracingSink)
        };
        Ok(Self {
            link: Box::new(HostLink::new()),
            http: Arc::new(ReqwestTransport::new()?),
            clock: Arc::new(TokioClock::new()),
            sink,
            probe: Arc::new(HostProbe),
        })
    }
}

/// Sensor node client
pub struct FieldNode {
    controller: LinkController,
    http: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn SystemProbe>,
    log: DebugLog,
    config: Option<NodeConfig>,
    engine: Option<PublishEngine>,
    policy: RetryPolicy,
    health: HealthTracker,
    heartbeat: HeartbeatScheduler,
}

impl FieldNode {
    pub fn new(ports: NodePorts) -> Self {
        let controller = LinkController::new(ports.link, ports.clock.clone());
        Self {
            controller,
            http: ports.http,
            clock: ports.clock,
            probe: ports.probe,
            log: DebugLog::new(ports.sink, false),
            config: None,
            engine: None,
            policy: RetryPolicy::default(),
            health: HealthTracker::new(5),
            heartbeat: HeartbeatScheduler::default(),
        }
    }

    /// Validate and capture `config`, and prime the link without connecting
    ///
    /// On error nothing changes.
    pub fn init(&mut self, config: NodeConfig) -> Result<(), ConfigError> {
        let config = config.validate()?;

        self.log.set_enabled(config.device.debug);
        self.engine = Some(PublishEngine::new(
            self.http.clone(),
            self.clock.clone(),
            &config.platform.base_url,
            &config.platform.api_key,
        ));
        self.policy = RetryPolicy::from_config(&config);
        self.health = HealthTracker::new(config.platform.max_consecutive_failures).with_secrets([
            config.platform.api_key.clone(),
            config.wifi.password.clone(),
        ]);
        self.heartbeat = HeartbeatScheduler::new(config.platform.heartbeat_interval_ms);
        self.controller
            .prime(&config.device.name, &config.wifi.ssid, &config.wifi.password);

        info!(
            device = %config.device.name,
            base_url = %config.platform.base_url,
            "Node initialized"
        );
        self.log.line(|| {
            format!(
                "Initialized for device: {} -> {}",
                config.device.name, config.platform.base_url
            )
        });
        self.config = Some(config);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.config.is_some()
    }

    pub fn config(&self) -> Option<&NodeConfig> {
        self.config.as_ref()
    }

    /// Bring the link up within the configured connection timeout
    pub async fn connect(&mut self) -> bool {
        let timeout_ms = self
            .config
            .as_ref()
            .map_or(0, |c| c.wifi.connection_timeout_ms);
        self.connect_with_timeout(timeout_ms).await
    }

    /// Bring the link up within `timeout_ms`
    pub async fn connect_with_timeout(&mut self, timeout_ms: u64) -> bool {
        if !self.is_initialized() {
            warn!("connect called before init");
            return false;
        }
        match self.controller.connect(timeout_ms, &self.log).await {
            Ok(()) => {
                self.health.record_success();
                true
            }
            Err(e) => {
                self.record_failure(&e.to_string()).await;
                false
            }
        }
    }

    pub fn is_up(&self) -> bool {
        self.controller.is_up()
    }

    /// Periodic maintenance: link status, reconnect policy, then heartbeat
    pub async fn tick(&mut self) {
        if !self.is_initialized() {
            return;
        }

        self.controller.observe();

        if self.controller.status() == NodeStatus::PlatformConfirmed && !self.heartbeat_fresh() {
            self.controller.apply(StatusEvent::HeartbeatStale);
        }

        let decision = self.controller.reconnect_decision(
            self.clock.now_ms(),
            self.auto_reconnect(),
            self.health.consecutive_failures(),
        );
        if decision == ReconnectDecision::Proceed {
            let failures = self.health.consecutive_failures();
            self.log
                .line(|| format!("Auto-reconnect triggered (failure count: {failures})"));
            self.connect().await;
        }

        let now = self.clock.now_ms();
        if self.controller.is_up()
            && self
                .heartbeat
                .is_due(now, self.health.record().last_heartbeat_at)
        {
            self.log
                .line(|| "Heartbeat interval reached, sending heartbeat...".to_string());
            self.force_heartbeat().await;
        }
    }

    /// Publish one round of readings; `-1` marks an absent optional reading
    pub async fn publish_sensors(
        &mut self,
        temperature: f32,
        humidity: f32,
        soil_moisture: f32,
        light_level: f32,
    ) -> Response {
        let readings =
            SensorReadings::from_sentinels(temperature, humidity, soil_moisture, light_level);
        self.publish_readings(&readings).await
    }

    pub async fn publish_readings(&mut self, readings: &SensorReadings) -> Response {
        let Some(config) = self.config.as_ref() else {
            return Response::rejected(PublishError::NotInitialized);
        };
        let frame = SensorFrame::new(readings, self.clock.now_ms(), &config.device.name);
        match encode(PayloadKind::Sensor, &frame) {
            Ok(document) => self.publish_raw(&document).await,
            Err(e) => Response::rejected(e),
        }
    }

    /// Publish a caller-built JSON object, wrapped under `payload`
    pub async fn publish_json(&mut self, object: &Value) -> Response {
        match payload::wrap_object(object) {
            Ok(document) => self.publish_raw(&document).await,
            Err(e) => Response::rejected(e),
        }
    }

    /// Publish a pre-wrapped document with the configured retry policy
    pub async fn publish_raw(&mut self, document: &str) -> Response {
        let policy = self.policy;
        self.publish_with_policy(document, policy).await
    }

    /// Publish a pre-wrapped document with an explicit retry policy
    pub async fn publish_with_policy(&mut self, document: &str, policy: RetryPolicy) -> Response {
        self.controller.observe();
        let Some(engine) = self.engine.as_ref() else {
            return Response::rejected(PublishError::NotInitialized);
        };
        let response = engine
            .publish(document, &policy, self.controller.is_up(), &self.log)
            .await;
        self.settle(&response).await;
        response
    }

    /// Send a heartbeat now, regardless of the schedule
    pub async fn force_heartbeat(&mut self) -> Response {
        let Some(config) = self.config.as_ref() else {
            return Response::rejected(PublishError::NotInitialized);
        };
        let document = self.heartbeat.document(
            self.clock.now_ms(),
            &config.device.name,
            self.controller.signal_strength(),
            self.probe.free_memory(),
        );
        let response = match document {
            Ok(document) => self.publish_raw(&document).await,
            Err(e) => Response::rejected(e),
        };
        if response.ok {
            debug!("Heartbeat delivered");
        } else {
            self.log
                .line(|| format!("Heartbeat failed: {}", response.error_detail));
        }
        response
    }

    /// Post a connectivity test frame with the latency-critical profile
    pub async fn test_connection(&mut self) -> bool {
        let Some(config) = self.config.as_ref() else {
            return false;
        };
        let frame = TestFrame {
            test: true,
            timestamp: self.clock.now_ms(),
            device: &config.device.name,
        };
        let document = match encode(PayloadKind::Test, &frame) {
            Ok(document) => document,
            Err(_) => return false,
        };
        self.log.line(|| "Testing platform connection...".to_string());
        let response = self
            .publish_with_policy(&document, RetryPolicy::latency_critical())
            .await;
        response.ok
    }

    /// Link, gateway, platform and payload checks; stops at the first failure
    ///
    /// Clears the error history when every check passes.
    pub async fn run_connectivity_test(&mut self) -> bool {
        self.log
            .line(|| "Running comprehensive connectivity test...".to_string());

        if !self.controller.is_up() {
            self.log
                .line(|| "Connectivity test failed: WiFi not connected".to_string());
            return false;
        }
        self.log.line(|| "WiFi connectivity test passed".to_string());

        if self.controller.diagnostics().gateway == Ipv4Addr::UNSPECIFIED {
            self.log
                .line(|| "Connectivity test failed: No gateway available".to_string());
            return false;
        }
        self.log.line(|| "Gateway connectivity test passed".to_string());

        if !self.test_connection().await {
            self.log
                .line(|| "Connectivity test failed: Platform unreachable".to_string());
            return false;
        }
        self.log.line(|| "Platform connectivity test passed".to_string());

        let probe = json!({ "payload": { "test": "connectivity" } }).to_string();
        if payload::validate(&probe).is_err() {
            self.log
                .line(|| "Connectivity test failed: JSON validation error".to_string());
            return false;
        }
        self.log.line(|| "JSON validation test passed".to_string());

        self.log.line(|| "All connectivity tests passed!".to_string());
        self.clear_errors();
        true
    }

    /// Drop the link; `tick` will not reconnect until the next `connect`
    pub fn disconnect(&mut self) {
        self.controller.disconnect(&self.log);
    }

    /// Current status, corrected for link loss or staleness since the last tick
    pub fn status(&self) -> NodeStatus {
        StatusProjection::project(
            self.controller.status(),
            self.controller.is_up(),
            self.heartbeat_fresh(),
        )
    }

    pub fn status_string(&self) -> &'static str {
        self.status().label()
    }

    /// Link up and a publish succeeded within twice the heartbeat interval
    pub fn is_platform_active(&self) -> bool {
        self.controller.is_up() && self.heartbeat_fresh()
    }

    /// Monotonic ms of the last successful publish
    pub fn last_heartbeat(&self) -> Option<u64> {
        self.health.record().last_heartbeat_at
    }

    pub fn health(&self) -> &HealthRecord {
        self.health.record()
    }

    pub fn signal_strength(&self) -> i32 {
        self.controller.signal_strength()
    }

    pub fn ip_address(&self) -> Ipv4Addr {
        self.controller.ip_address()
    }

    pub fn mac_address(&self) -> String {
        self.controller.mac_address()
    }

    pub fn last_error(&self) -> String {
        self.health.last_error(self.clock.now_ms())
    }

    pub fn clear_errors(&mut self) {
        self.health.clear_errors();
        self.log.line(|| "Error history cleared".to_string());
    }

    /// Number of link resets forced by repeated failures
    pub fn reset_count(&self) -> u32 {
        self.controller.reset_count()
    }

    pub fn set_debug(&mut self, enable: bool) {
        self.log.set_enabled(enable);
        if let Some(config) = self.config.as_mut() {
            config.device.debug = enable;
        }
        self.log.line(|| "Debug mode enabled".to_string());
    }

    pub fn set_connection_timeout(&mut self, timeout_ms: u64) {
        let Some(config) = self.config.as_mut() else {
            return ignored_before_init("connection timeout");
        };
        config.wifi.connection_timeout_ms = timeout_ms;
        self.log
            .line(|| format!("Connection timeout set to {timeout_ms}ms"));
    }

    pub fn set_retry_config(&mut self, max_retries: u32, retry_delay_ms: u64) {
        let Some(config) = self.config.as_mut() else {
            return ignored_before_init("retry config");
        };
        config.platform.max_retries = max_retries.max(1);
        config.platform.retry_delay_ms = retry_delay_ms;
        self.policy = RetryPolicy::from_config(config);
        let policy = self.policy;
        self.log.line(|| {
            format!(
                "Retry config: {} attempts, {}ms base delay",
                policy.max_attempts, policy.base_delay_ms
            )
        });
    }

    pub fn set_heartbeat_interval(&mut self, interval_ms: u64) {
        let Some(config) = self.config.as_mut() else {
            return ignored_before_init("heartbeat interval");
        };
        config.platform.heartbeat_interval_ms = interval_ms;
        self.heartbeat.set_interval_ms(interval_ms);
        self.log
            .line(|| format!("Heartbeat interval set to {interval_ms}ms"));
    }

    pub fn set_auto_reconnect(&mut self, enable: bool) {
        let Some(config) = self.config.as_mut() else {
            return ignored_before_init("auto-reconnect");
        };
        config.wifi.auto_reconnect = enable;
        self.log
            .line(|| format!("Auto-reconnect {}", if enable { "enabled" } else { "disabled" }));
    }

    pub fn set_max_consecutive_failures(&mut self, max_failures: u32) {
        let Some(config) = self.config.as_mut() else {
            return ignored_before_init("max consecutive failures");
        };
        config.platform.max_consecutive_failures = max_failures.max(1);
        self.health.set_max_consecutive_failures(max_failures);
        self.log
            .line(|| format!("Max consecutive failures set to {}", max_failures.max(1)));
    }

    /// Structured snapshot of the node
    pub fn diagnostics(&self) -> Diagnostics {
        let now = self.clock.now_ms();
        let record = self.health.record();
        let link_up = self.controller.is_up();
        let (device_name, endpoint) = match (&self.config, &self.engine) {
            (Some(config), Some(engine)) => {
                (config.device.name.clone(), engine.endpoint().to_string())
            }
            _ => (String::new(), String::new()),
        };

        Diagnostics {
            device_name,
            endpoint,
            status: self.status(),
            link_up,
            platform_active: self.is_platform_active(),
            consecutive_failures: record.consecutive_failures,
            max_consecutive_failures: record.max_consecutive_failures,
            seconds_since_heartbeat: record.seconds_since_heartbeat(now),
            heartbeat_interval_ms: self.heartbeat.interval_ms(),
            auto_reconnect: self.auto_reconnect(),
            free_memory: self.probe.free_memory(),
            uptime_seconds: now / 1_000,
            link: link_up.then(|| self.controller.diagnostics()),
            last_error: match record.last_error_at {
                Some(at) if !record.last_error_message.is_empty() => Some(ErrorSnapshot {
                    message: record.last_error_message.clone(),
                    age_seconds: now.saturating_sub(at) / 1_000,
                }),
                _ => None,
            },
        }
    }

    /// [`Self::diagnostics`] rendered for a console
    pub fn diagnostics_text(&self) -> String {
        self.diagnostics().to_string()
    }

    /// Flat status object for dashboards
    pub fn detailed_status(&self) -> Value {
        let record = self.health.record();
        let mut status = json!({
            "status": self.status_string(),
            "wifi_connected": self.controller.is_up(),
            "platform_active": self.is_platform_active(),
            "signal_strength": self.signal_strength(),
            "ip_address": self.ip_address().to_string(),
            "mac_address": self.mac_address(),
            "consecutive_failures": record.consecutive_failures,
            "max_failures": record.max_consecutive_failures,
            "auto_reconnect": self.auto_reconnect(),
            "last_heartbeat": record.last_heartbeat_at,
            "heartbeat_interval": self.heartbeat.interval_ms(),
            "uptime_seconds": self.clock.now_ms() / 1_000,
            "free_memory": self.probe.free_memory(),
        });
        if let (Some(at), false) = (record.last_error_at, record.last_error_message.is_empty()) {
            status["last_error"] = json!(record.last_error_message);
            status["error_time"] = json!(at);
        }
        status
    }

    fn heartbeat_fresh(&self) -> bool {
        self.health
            .record()
            .heartbeat_fresh(self.clock.now_ms(), self.heartbeat.interval_ms())
    }

    fn auto_reconnect(&self) -> bool {
        self.config.as_ref().is_some_and(|c| c.wifi.auto_reconnect)
    }

    /// Health and status bookkeeping after a publish
    async fn settle(&mut self, response: &Response) {
        if response.ok {
            self.health.mark_heartbeat(self.clock.now_ms());
            self.health.record_success();
            self.controller.apply(StatusEvent::PublishConfirmed);
        } else if response.error_kind.is_wire_failure() {
            self.record_failure(&response.error_detail).await;
        }
    }

    async fn record_failure(&mut self, message: &str) {
        let now = self.clock.now_ms();
        let verdict = self.health.record_failure(now, message);
        let failures = match verdict {
            FailureVerdict::ResetRequired => self.health.max_consecutive_failures(),
            FailureVerdict::Recorded => self.health.consecutive_failures(),
        };
        self.log
            .line(|| format!("Connection failure #{failures}: {message}"));
        if verdict == FailureVerdict::ResetRequired {
            self.log.line(|| {
                "Maximum consecutive failures reached, resetting connection...".to_string()
            });
            self.controller.reset(&self.log).await;
        }
    }
}

fn ignored_before_init(setting: &str) {
    warn!("Ignoring {} change before init", setting);
}
