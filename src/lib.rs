//! fieldnode - sensor node client for an HTTP ingestion platform
//!
//! Brings a wireless link up, keeps it up across transient failures, sends
//! heartbeats on a fixed cadence, and posts JSON sensor frames to
//! `{base_url}/api/ingest` with bounded retry and linear backoff.
//!
//! # Overview
//!
//! - [`node::FieldNode`] is the single instance a caller holds
//! - [`transport::Link`] and [`transport::HttpTransport`] are the platform ports
//! - [`clock::Clock`] supplies monotonic time and every suspension point
//! - [`testing`] provides mocks for all ports
//!
//! # Quick Start
//!
//! ```rust
//! use fieldnode::config::NodeConfig;
//! use fieldnode::node::{FieldNode, NodePorts};
//! use fieldnode::testing::{FixedProbe, MemorySink, MockClock, MockHttpTransport, MockLink};
//! use std::sync::Arc;
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let clock = MockClock::new();
//! let http = MockHttpTransport::new().with_default_reply(201, r#"{"ok":true}"#);
//! let mut node = FieldNode::new(NodePorts {
//!     link: Box::new(MockLink::new(clock.clone())),
//!     http: Arc::new(http.clone()),
//!     clock: Arc::new(clock),
//!     sink: Arc::new(MemorySink::new()),
//!     probe: Arc::new(FixedProbe::default()),
//! });
//!
//! node.init(NodeConfig::new("home", "pw", "k", "https://ex.test", "probe"))
//!     .unwrap();
//! assert!(node.connect().await);
//!
//! let response = node.publish_sensors(23.5, 60.0, -1.0, -1.0).await;
//! assert!(response.ok);
//! assert_eq!(response.http_code, 201);
//! # });
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod heartbeat;
pub mod link;
pub mod node;
pub mod observability;
pub mod publish;
pub mod status;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, NodeConfig};
pub use error::{ErrorKind, LinkError, PublishError};
pub use node::{FieldNode, NodePorts};
pub use publish::{Response, RetryPolicy, SensorReadings};
pub use status::{Diagnostics, NodeStatus};
