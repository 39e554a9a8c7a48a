//! Heartbeat scheduling
//!
//! Heartbeats and data publishes share one keepalive timer: any successful
//! publish moves `last_heartbeat_at`, so a node that publishes often never
//! sends a synthetic heartbeat.

use crate::error::PublishError;
use crate::publish::payload::{encode, HeartbeatFrame, PayloadKind};

/// Default heartbeat cadence
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 300_000;

/// Decides when a heartbeat is due and builds its document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatScheduler {
    interval_ms: u64,
}

impl Default for HeartbeatScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_INTERVAL_MS)
    }
}

impl HeartbeatScheduler {
    pub fn new(interval_ms: u64) -> Self {
        Self { interval_ms }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn set_interval_ms(&mut self, interval_ms: u64) {
        self.interval_ms = interval_ms;
    }

    /// Due when more than one interval has passed since the last success
    ///
    /// A node that never published counts from the clock origin. An interval
    /// of zero is always due.
    pub fn is_due(&self, now: u64, last_heartbeat_at: Option<u64>) -> bool {
        if self.interval_ms == 0 {
            return true;
        }
        now.saturating_sub(last_heartbeat_at.unwrap_or(0)) > self.interval_ms
    }

    /// Serialized heartbeat document for `now`
    pub fn document(
        &self,
        now: u64,
        device_name: &str,
        signal_strength: i32,
        free_memory: u32,
    ) -> Result<String, PublishError> {
        let frame = HeartbeatFrame {
            heartbeat: true,
            timestamp: now,
            device_name,
            signal_strength,
            free_memory,
            uptime: now / 1_000,
        };
        encode(PayloadKind::Heartbeat, &frame)
    }
}
