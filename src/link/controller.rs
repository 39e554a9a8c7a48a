//! Link controller: brings the wireless link up and keeps the status in step
//! with what the driver reports

use super::reconnect::{should_attempt_reconnection, ReconnectContext, ReconnectDecision};
use crate::clock::Clock;
use crate::error::LinkError;
use crate::link_span;
use crate::observability::DebugLog;
use crate::status::{NodeStatus, StatusEvent, StatusProjection};
use crate::transport::{Link, LinkDiagnostics};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Link status poll cadence while connecting
pub const POLL_INTERVAL_MS: u64 = 500;

/// Settle time between tear-down and re-prime in [`LinkController::reset`]
pub const RESET_SETTLE_MS: u64 = 1_000;

/// Signal strength reported while the link is down
pub const NO_SIGNAL_DBM: i32 = -999;

struct Credentials {
    hostname: String,
    ssid: String,
    password: String,
}

/// Owns the link driver and the projected [`NodeStatus`]
pub struct LinkController {
    link: Box<dyn Link>,
    clock: Arc<dyn Clock>,
    credentials: Option<Credentials>,
    status: NodeStatus,
    last_connect_attempt: Option<u64>,
    manually_disconnected: bool,
    engaged: bool,
    reset_count: u32,
}

impl LinkController {
    pub fn new(link: Box<dyn Link>, clock: Arc<dyn Clock>) -> Self {
        Self {
            link,
            clock,
            credentials: None,
            status: NodeStatus::Disconnected,
            last_connect_attempt: None,
            manually_disconnected: false,
            engaged: false,
            reset_count: 0,
        }
    }

    /// Capture credentials without touching the radio
    pub fn prime(&mut self, hostname: &str, ssid: &str, password: &str) {
        self.credentials = Some(Credentials {
            hostname: hostname.to_string(),
            ssid: ssid.to_string(),
            password: password.to_string(),
        });
        self.status = NodeStatus::Disconnected;
        self.last_connect_attempt = None;
        self.manually_disconnected = false;
    }

    pub fn is_primed(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn is_up(&self) -> bool {
        self.link.is_up()
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn last_connect_attempt(&self) -> Option<u64> {
        self.last_connect_attempt
    }

    pub fn is_manually_disconnected(&self) -> bool {
        self.manually_disconnected
    }

    /// Number of resets since construction
    pub fn reset_count(&self) -> u32 {
        self.reset_count
    }

    /// Feed an event through the status projection
    pub fn apply(&mut self, event: StatusEvent) -> NodeStatus {
        let next = StatusProjection::determine_next_state(self.status, &event);
        if next != self.status {
            StatusProjection::log_state_transition(self.status, next);
            self.status = next;
        }
        self.status
    }

    /// Bring the link up, polling every [`POLL_INTERVAL_MS`] up to `timeout_ms`
    pub async fn connect(&mut self, timeout_ms: u64, log: &DebugLog) -> Result<(), LinkError> {
        let Some(creds) = self.credentials.as_ref() else {
            return Err(LinkError::NotPrimed);
        };
        let span = link_span!(ssid = %creds.ssid, timeout_ms);
        self.connect_inner(timeout_ms, log).instrument(span).await
    }

    async fn connect_inner(&mut self, timeout_ms: u64, log: &DebugLog) -> Result<(), LinkError> {
        let started = self.clock.now_ms();
        self.manually_disconnected = false;
        self.last_connect_attempt = Some(started);
        self.apply(StatusEvent::ConnectStarted);

        if timeout_ms == 0 {
            self.apply(StatusEvent::ConnectTimedOut);
            return Err(LinkError::Timeout { timeout_ms });
        }

        if let Some(creds) = self.credentials.as_ref() {
            log.line(|| format!("Connecting to WiFi: {}", creds.ssid));
            self.link.configure(&creds.hostname);
            self.link.begin(&creds.ssid, &creds.password);
            self.engaged = true;
        }

        loop {
            if self.link.is_up() {
                self.apply(StatusEvent::LinkEstablished);
                let diag = self.link.diagnostics();
                info!(ip = %diag.ip, rssi = diag.rssi, "Link up");
                log.line(|| format!("WiFi connected! IP address: {}", diag.ip));
                return Ok(());
            }

            let elapsed = self.clock.now_ms().saturating_sub(started);
            if elapsed >= timeout_ms {
                break;
            }
            self.clock
                .sleep_ms(POLL_INTERVAL_MS.min(timeout_ms - elapsed))
                .await;
        }

        self.apply(StatusEvent::ConnectTimedOut);
        let err = LinkError::Timeout { timeout_ms };
        log.line(|| format!("WiFi connection failed: {err}"));
        Err(err)
    }

    /// Tear the link down, let it settle, and re-prime it
    pub async fn reset(&mut self, log: &DebugLog) {
        log.line(|| "Resetting connection state...".to_string());
        warn!("Resetting link after repeated failures");
        self.link.tear_down();
        self.clock.sleep_ms(RESET_SETTLE_MS).await;
        if let Some(creds) = self.credentials.as_ref() {
            self.link.configure(&creds.hostname);
        }
        self.last_connect_attempt = None;
        self.reset_count += 1;
        self.apply(StatusEvent::Reset);
        log.line(|| "Connection state reset complete".to_string());
    }

    /// Drop the link and hold it down until the next `connect`
    pub fn disconnect(&mut self, log: &DebugLog) {
        log.line(|| "Disconnecting...".to_string());
        self.link.tear_down();
        self.engaged = false;
        self.manually_disconnected = true;
        self.apply(StatusEvent::Disconnected);
    }

    /// Reconcile the status with the driver's view of the link
    pub fn observe(&mut self) {
        let up = self.link.is_up();
        match (self.status, up) {
            (NodeStatus::LinkConnecting, true) => {
                self.apply(StatusEvent::LinkEstablished);
            }
            (NodeStatus::Disconnected | NodeStatus::Faulted, true)
                if !self.manually_disconnected =>
            {
                debug!("Link came up outside connect");
                self.apply(StatusEvent::LinkEstablished);
            }
            (NodeStatus::LinkUp | NodeStatus::PlatformConfirmed, false) => {
                self.apply(StatusEvent::LinkLost);
            }
            _ => {}
        }
    }

    /// Whether the periodic tick should call `connect` now
    pub fn reconnect_decision(
        &self,
        now: u64,
        auto_reconnect: bool,
        consecutive_failures: u32,
    ) -> ReconnectDecision {
        should_attempt_reconnection(&ReconnectContext {
            auto_reconnect,
            link_up: self.link.is_up(),
            status: self.status,
            manually_disconnected: self.manually_disconnected,
            now,
            last_connect_attempt: self.last_connect_attempt,
            consecutive_failures,
        })
    }

    pub fn diagnostics(&self) -> LinkDiagnostics {
        self.link.diagnostics()
    }

    /// RSSI in dBm, or [`NO_SIGNAL_DBM`] while down
    pub fn signal_strength(&self) -> i32 {
        if self.link.is_up() {
            self.link.diagnostics().rssi
        } else {
            NO_SIGNAL_DBM
        }
    }

    pub fn ip_address(&self) -> Ipv4Addr {
        if self.link.is_up() {
            self.link.diagnostics().ip
        } else {
            Ipv4Addr::UNSPECIFIED
        }
    }

    pub fn mac_address(&self) -> String {
        self.link.diagnostics().mac
    }
}

impl Drop for LinkController {
    fn drop(&mut self) {
        if self.engaged {
            self.link.tear_down();
        }
    }
}
