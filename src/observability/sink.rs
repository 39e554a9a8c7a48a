//! Debug-line sink
//!
//! The node narrates what it is doing one line at a time, the way firmware
//! prints to a serial console. Lines only reach the sink when debug output is
//! enabled; otherwise the sink is never called.

use std::io::Write;
use std::sync::Arc;

/// Prefix prepended to every console line
pub const LINE_PREFIX: &str = "[fieldnode] ";

/// Destination for annotated debug lines
pub trait DebugSink: Send + Sync {
    fn line(&self, line: &str);
}

/// Sink forwarding lines to `tracing` at DEBUG level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DebugSink for TracingSink {
    fn line(&self, line: &str) {
        tracing::debug!(target: "fieldnode::console", "{}", line);
    }
}

/// Sink writing prefixed lines to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl DebugSink for ConsoleSink {
    fn line(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        // Console output is best effort.
        let _ = writeln!(out, "{LINE_PREFIX}{line}");
    }
}

/// Gate in front of a [`DebugSink`]
#[derive(Clone)]
pub struct DebugLog {
    enabled: bool,
    sink: Arc<dyn DebugSink>,
}

impl DebugLog {
    pub fn new(sink: Arc<dyn DebugSink>, enabled: bool) -> Self {
        Self { enabled, sink }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Emit a line; the message is only built when debug output is on
    pub fn line<F>(&self, message: F)
    where
        F: FnOnce() -> String,
    {
        if self.enabled {
            self.sink.line(&message());
        }
    }
}

impl std::fmt::Debug for DebugLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugLog")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
