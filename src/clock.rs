//! Time and platform probes
//!
//! Every timer in the crate is expressed in monotonic milliseconds read from
//! a [`Clock`]. Suspension points go through [`Clock::sleep_ms`] so tests can
//! run against virtual time.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Monotonic millisecond time source
#[async_trait]
pub trait Clock: Send + Sync {
    /// Milliseconds since the clock was created
    fn now_ms(&self) -> u64;

    /// Suspend the caller for `ms` milliseconds
    async fn sleep_ms(&self, ms: u64);
}

/// Clock backed by the tokio timer
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    async fn sleep_ms(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Platform statistics reported in heartbeats and diagnostics
pub trait SystemProbe: Send + Sync {
    /// Free memory in bytes
    fn free_memory(&self) -> u32;
}

/// Probe reading `MemAvailable` from `/proc/meminfo`
#[derive(Debug, Default, Clone, Copy)]
pub struct HostProbe;

impl SystemProbe for HostProbe {
    fn free_memory(&self) -> u32 {
        std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|content| parse_mem_available(&content))
            .unwrap_or(0)
    }
}

/// Extract `MemAvailable` in bytes, saturating at `u32::MAX`
fn parse_mem_available(meminfo: &str) -> Option<u32> {
    let line = meminfo.lines().find(|l| l.starts_with("MemAvailable:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib.saturating_mul(1024).min(u32::MAX as u64) as u32)
}
