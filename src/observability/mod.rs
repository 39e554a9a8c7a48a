//! Observability: structured logging and the debug-line sink

pub mod logging;
pub mod sink;

pub use logging::{init_default_logging, init_logging, LogFormat};
pub use sink::{ConsoleSink, DebugLog, DebugSink, TracingSink};

pub use logging::{link_span, publish_span};
