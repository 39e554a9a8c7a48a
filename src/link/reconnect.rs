//! Pure reconnect decision logic

use crate::status::NodeStatus;

/// Cooldown after a connect attempt with no recorded failures
pub const BASE_COOLDOWN_MS: u64 = 30_000;

/// Extra cooldown per consecutive failure
pub const COOLDOWN_STEP_MS: u64 = 10_000;

/// Time to wait after the last connect attempt before trying again
pub fn cooldown_ms(consecutive_failures: u32) -> u64 {
    BASE_COOLDOWN_MS.saturating_add(COOLDOWN_STEP_MS.saturating_mul(u64::from(consecutive_failures)))
}

/// Inputs to the reconnect decision, read once per tick
#[derive(Debug, Clone, Copy)]
pub struct ReconnectContext {
    pub auto_reconnect: bool,
    pub link_up: bool,
    pub status: NodeStatus,
    pub manually_disconnected: bool,
    pub now: u64,
    /// `None` when no attempt was made since the last reset
    pub last_connect_attempt: Option<u64>,
    pub consecutive_failures: u32,
}

/// Decision result for a reconnect check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Call `connect` now
    Proceed,
    /// Cooldown still running
    Wait { remaining_ms: u64 },
    /// Auto-reconnect is switched off
    AbortDisabled,
    /// Nothing to do: link is up
    AbortLinkUp,
    /// A connect is already in flight
    AbortConnecting,
    /// The caller disconnected on purpose
    AbortManualDisconnect,
}

/// Decide whether the periodic tick should reconnect
pub fn should_attempt_reconnection(ctx: &ReconnectContext) -> ReconnectDecision {
    if !ctx.auto_reconnect {
        return ReconnectDecision::AbortDisabled;
    }
    if ctx.link_up {
        return ReconnectDecision::AbortLinkUp;
    }
    if ctx.status == NodeStatus::LinkConnecting {
        return ReconnectDecision::AbortConnecting;
    }
    if ctx.manually_disconnected {
        return ReconnectDecision::AbortManualDisconnect;
    }

    let Some(last) = ctx.last_connect_attempt else {
        return ReconnectDecision::Proceed;
    };
    let elapsed = ctx.now.saturating_sub(last);
    let cooldown = cooldown_ms(ctx.consecutive_failures);
    if elapsed >= cooldown {
        ReconnectDecision::Proceed
    } else {
        ReconnectDecision::Wait {
            remaining_ms: cooldown - elapsed,
        }
    }
}
