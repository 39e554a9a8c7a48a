//! Health tracking for the publish and link paths
//!
//! Counts consecutive failures, keeps the last error, and tells the caller
//! when the link has failed often enough to be torn down and re-primed.

use crate::error::sanitize_error_message;
use serde::Serialize;
use tracing::{debug, warn};

/// Snapshot of failure and liveness bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthRecord {
    pub consecutive_failures: u32,
    pub max_consecutive_failures: u32,
    /// Monotonic ms of the last recorded failure
    pub last_error_at: Option<u64>,
    pub last_error_message: String,
    /// Monotonic ms of the last successful publish of any kind
    pub last_heartbeat_at: Option<u64>,
}

impl HealthRecord {
    pub fn new(max_consecutive_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_consecutive_failures: max_consecutive_failures.max(1),
            last_error_at: None,
            last_error_message: String::new(),
            last_heartbeat_at: None,
        }
    }

    /// Whether the last successful publish is younger than twice `interval_ms`
    pub fn heartbeat_fresh(&self, now: u64, interval_ms: u64) -> bool {
        self.last_heartbeat_at
            .is_some_and(|at| now.saturating_sub(at) < interval_ms.saturating_mul(2))
    }

    /// Seconds since the last successful publish, if there was one
    pub fn seconds_since_heartbeat(&self, now: u64) -> Option<u64> {
        self.last_heartbeat_at
            .map(|at| now.saturating_sub(at) / 1_000)
    }
}

/// What the caller must do after a failure was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureVerdict {
    Recorded,
    /// Threshold reached; the counter is already back at zero
    ResetRequired,
}

/// Owns the [`HealthRecord`] and scrubs secrets out of stored messages
#[derive(Debug, Clone)]
pub struct HealthTracker {
    record: HealthRecord,
    secrets: Vec<String>,
}

impl HealthTracker {
    pub fn new(max_consecutive_failures: u32) -> Self {
        Self {
            record: HealthRecord::new(max_consecutive_failures),
            secrets: Vec::new(),
        }
    }

    /// Values redacted from every stored error message
    pub fn with_secrets<I, S>(mut self, secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secrets = secrets
            .into_iter()
            .map(Into::into)
            .filter(|s: &String| !s.is_empty())
            .collect();
        self
    }

    pub fn record(&self) -> &HealthRecord {
        &self.record
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.record.consecutive_failures
    }

    pub fn max_consecutive_failures(&self) -> u32 {
        self.record.max_consecutive_failures
    }

    /// Change the reset threshold
    ///
    /// A counter already at or above the new threshold is pulled down to one
    /// below it, so the next failure triggers the reset.
    pub fn set_max_consecutive_failures(&mut self, max: u32) {
        let max = max.max(1);
        self.record.max_consecutive_failures = max;
        if self.record.consecutive_failures >= max {
            self.record.consecutive_failures = max - 1;
        }
    }

    pub fn record_failure(&mut self, now: u64, message: &str) -> FailureVerdict {
        let secrets: Vec<&str> = self.secrets.iter().map(String::as_str).collect();
        let message = sanitize_error_message(message, &secrets);

        self.record.consecutive_failures += 1;
        self.record.last_error_at = Some(now);
        warn!(
            failures = self.record.consecutive_failures,
            max = self.record.max_consecutive_failures,
            error = %message,
            "Failure recorded"
        );
        self.record.last_error_message = message;

        if self.record.consecutive_failures >= self.record.max_consecutive_failures {
            self.record.consecutive_failures = 0;
            FailureVerdict::ResetRequired
        } else {
            FailureVerdict::Recorded
        }
    }

    pub fn record_success(&mut self) {
        if self.record.consecutive_failures > 0 {
            debug!(
                failures = self.record.consecutive_failures,
                "Success after failures, counter cleared"
            );
        }
        self.record.consecutive_failures = 0;
    }

    pub fn mark_heartbeat(&mut self, now: u64) {
        self.record.last_heartbeat_at = Some(now);
    }

    pub fn clear_errors(&mut self) {
        self.record.consecutive_failures = 0;
        self.record.last_error_at = None;
        self.record.last_error_message.clear();
    }

    /// Last error with its age, e.g. `[12s ago] service unavailable`
    pub fn last_error(&self, now: u64) -> String {
        match self.record.last_error_at {
            Some(at) if !self.record.last_error_message.is_empty() => format!(
                "[{}s ago] {}",
                now.saturating_sub(at) / 1_000,
                self.record.last_error_message
            ),
            _ => "No errors recorded".to_string(),
        }
    }
}
