//! Retry policy and outcome classification
//!
//! Classification is a pure function of the transport code, so the attempt
//! loop in [`super::engine`] only decides whether to sleep and go again.

use crate::config::NodeConfig;
use crate::error::PublishError;
use std::time::Duration;

/// Attempts, backoff and per-attempt timeout for one publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (at least 1)
    pub max_attempts: u32,
    /// Linear backoff base: attempt `n` is followed by `n * base_delay_ms`
    pub base_delay_ms: u64,
    /// Timeout handed to the transport for each attempt
    pub http_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::sensor_data()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, http_timeout_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            http_timeout_ms,
        }
    }

    /// Profile for sensor frames: 3 attempts, 2 s base delay, 15 s timeout
    pub fn sensor_data() -> Self {
        Self::new(3, 2_000, 15_000)
    }

    /// Profile for interactive checks: 2 attempts, 2 s base delay, 5 s timeout
    pub fn latency_critical() -> Self {
        Self::new(2, 2_000, 5_000)
    }

    /// Policy described by the platform section of a configuration
    pub fn from_config(config: &NodeConfig) -> Self {
        Self::new(
            config.platform.max_retries,
            config.platform.retry_delay_ms,
            config.platform.http_timeout_ms,
        )
    }

    /// Delay after a failed `attempt` (1-based) before the next one
    pub fn delay_for(&self, attempt: u32) -> u64 {
        self.base_delay_ms.saturating_mul(u64::from(attempt))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Wall-clock budget of one publish
    ///
    /// Every attempt runs to its timeout and every inter-attempt delay is
    /// slept. The engine stops retrying once the next delay would overrun it.
    pub fn worst_case_ms(&self) -> u64 {
        let delays: u64 = (1..self.max_attempts).map(|a| self.delay_for(a)).sum();
        self.http_timeout_ms
            .saturating_mul(u64::from(self.max_attempts))
            .saturating_add(delays)
    }
}

/// What one exchange means for the publish as a whole
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Accepted by the platform
    Delivered,
    /// Failed; another attempt will not help
    Terminal(PublishError),
    /// Failed; worth another attempt if the budget allows
    Retryable(PublishError),
}

/// Classify a transport code (HTTP status, or `<= 0` for transport failure)
pub fn classify(code: i32) -> Outcome {
    let error = match code {
        200..=399 => return Outcome::Delivered,
        401 => PublishError::AuthRejected,
        400 => PublishError::BadRequest,
        503 => PublishError::ServiceUnavailable,
        c if c <= 0 => PublishError::Transport { code: c },
        c => PublishError::ServerError { code: c },
    };
    if error.kind().is_retryable() {
        Outcome::Retryable(error)
    } else {
        Outcome::Terminal(error)
    }
}
