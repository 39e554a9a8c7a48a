//! Status projection and diagnostics
//!
//! [`StatusProjection`] holds the transition table as pure functions. The
//! node feeds it events from the link controller, the publish engine and the
//! heartbeat scheduler; nothing else writes the status.

use crate::transport::LinkDiagnostics;
use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

/// Projected node status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Disconnected,
    LinkConnecting,
    LinkUp,
    /// Link up and a publish succeeded within twice the heartbeat interval
    PlatformConfirmed,
    Faulted,
}

impl NodeStatus {
    /// Operator-facing label
    pub fn label(self) -> &'static str {
        match self {
            NodeStatus::Disconnected => "Disconnected",
            NodeStatus::LinkConnecting => "WiFi Connecting",
            NodeStatus::LinkUp => "WiFi Connected",
            NodeStatus::PlatformConfirmed => "Platform Connected",
            NodeStatus::Faulted => "Error",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Events that move the status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// `connect` started
    ConnectStarted,
    /// The driver reports the link up
    LinkEstablished,
    /// `connect` ran out of time
    ConnectTimedOut,
    /// A publish returned 2xx/3xx
    PublishConfirmed,
    /// The driver reports the link down
    LinkLost,
    /// No successful publish within twice the heartbeat interval
    HeartbeatStale,
    /// Link torn down and re-primed after repeated failures
    Reset,
    /// Caller asked to disconnect
    Disconnected,
}

/// Pure status transition logic
pub struct StatusProjection;

impl StatusProjection {
    /// Next status after `event`; events that do not apply leave it unchanged
    pub fn determine_next_state(current: NodeStatus, event: &StatusEvent) -> NodeStatus {
        use NodeStatus::*;

        match (current, event) {
            (_, StatusEvent::ConnectStarted) => LinkConnecting,
            (LinkConnecting | Disconnected | Faulted, StatusEvent::LinkEstablished) => LinkUp,
            (LinkConnecting, StatusEvent::ConnectTimedOut) => Faulted,
            (LinkUp | PlatformConfirmed, StatusEvent::PublishConfirmed) => PlatformConfirmed,
            (LinkUp | PlatformConfirmed, StatusEvent::LinkLost) => Disconnected,
            (PlatformConfirmed, StatusEvent::HeartbeatStale) => LinkUp,
            (_, StatusEvent::Reset | StatusEvent::Disconnected) => Disconnected,
            (state, _) => state,
        }
    }

    /// Status as a reader sees it between ticks
    ///
    /// A dropped link or a stale heartbeat overrides the cached status.
    pub fn project(cached: NodeStatus, link_up: bool, heartbeat_fresh: bool) -> NodeStatus {
        use NodeStatus::*;

        match cached {
            LinkUp | PlatformConfirmed if !link_up => Disconnected,
            PlatformConfirmed if !heartbeat_fresh => LinkUp,
            state => state,
        }
    }

    pub fn log_state_transition(from: NodeStatus, to: NodeStatus) {
        match (from, to) {
            (NodeStatus::LinkConnecting, NodeStatus::LinkUp) => {
                info!("Link established");
            }
            (NodeStatus::LinkUp, NodeStatus::PlatformConfirmed) => {
                info!("Platform confirmed");
            }
            (NodeStatus::LinkUp | NodeStatus::PlatformConfirmed, NodeStatus::Disconnected) => {
                warn!("Link lost or closed");
            }
            (NodeStatus::PlatformConfirmed, NodeStatus::LinkUp) => {
                warn!("Platform heartbeat stale");
            }
            (_, NodeStatus::Faulted) => {
                error!("Link failed to come up");
            }
            _ => {
                info!("Node status: {:?} -> {:?}", from, to);
            }
        }
    }
}

/// Last recorded error with its age
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorSnapshot {
    pub message: String,
    pub age_seconds: u64,
}

/// Consolidated node snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub device_name: String,
    pub endpoint: String,
    pub status: NodeStatus,
    pub link_up: bool,
    pub platform_active: bool,
    pub consecutive_failures: u32,
    pub max_consecutive_failures: u32,
    pub seconds_since_heartbeat: Option<u64>,
    pub heartbeat_interval_ms: u64,
    pub auto_reconnect: bool,
    pub free_memory: u32,
    pub uptime_seconds: u64,
    /// Present only while the link is up
    pub link: Option<LinkDiagnostics>,
    pub last_error: Option<ErrorSnapshot>,
}

impl Diagnostics {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} Connection Diagnostics ===", self.device_name)?;
        writeln!(f, "Status: {}", self.status)?;
        writeln!(f, "Platform Active: {}", yes_no(self.platform_active))?;
        writeln!(
            f,
            "Consecutive Failures: {}/{}",
            self.consecutive_failures, self.max_consecutive_failures
        )?;
        match self.seconds_since_heartbeat {
            Some(secs) => writeln!(f, "Last Heartbeat: {secs}s ago")?,
            None => writeln!(f, "Last Heartbeat: never")?,
        }
        writeln!(
            f,
            "Auto-reconnect: {}",
            if self.auto_reconnect { "Enabled" } else { "Disabled" }
        )?;
        writeln!(f, "Free Memory: {} bytes", self.free_memory)?;
        writeln!(f, "Uptime: {}s", self.uptime_seconds)?;

        if let Some(link) = &self.link {
            writeln!(f, "Link Diagnostics:")?;
            writeln!(f, "  Status Code: {}", link.status_code)?;
            writeln!(f, "  SSID: {}", link.ssid)?;
            writeln!(f, "  Signal: {} dBm", link.rssi)?;
            writeln!(f, "  IP: {}", link.ip)?;
            writeln!(f, "  Gateway: {}", link.gateway)?;
            writeln!(f, "  DNS: {}", link.dns)?;
            writeln!(f, "  MAC: {}", link.mac)?;
        }

        if let Some(err) = &self.last_error {
            writeln!(f, "Last Error: {}", err.message)?;
            writeln!(f, "Error Time: {}s ago", err.age_seconds)?;
        }
        Ok(())
    }
}
