//! Link controller and reconnect policy

pub mod controller;
pub mod reconnect;

pub use controller::{LinkController, NO_SIGNAL_DBM, POLL_INTERVAL_MS, RESET_SETTLE_MS};
pub use reconnect::{cooldown_ms, should_attempt_reconnection, ReconnectContext, ReconnectDecision};
