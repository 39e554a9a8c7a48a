//! Platform ports for the wireless link and the HTTP stack
//!
//! All platform coupling lives behind [`Link`] and [`HttpTransport`]. The
//! link controller and the publish engine only see these traits, so the state
//! machine runs unchanged against real drivers or the mocks in
//! [`crate::testing`].

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::time::Duration;

pub mod host;
pub mod http;

/// Transport failure codes reported in place of an HTTP status
///
/// Any code `<= 0` means no HTTP exchange completed.
pub mod codes {
    /// The connection could not be established
    pub const CONNECTION_REFUSED: i32 = -1;
    /// The request could not be sent
    pub const SEND_FAILED: i32 = -3;
    /// The response body could not be read
    pub const NO_STREAM: i32 = -7;
    /// No response within the request timeout
    pub const READ_TIMEOUT: i32 = -11;
}

/// Layer-3 link state reported by the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkDiagnostics {
    /// Driver-specific status code
    pub status_code: i32,
    pub ssid: String,
    /// Signal strength in dBm
    pub rssi: i32,
    pub ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Ipv4Addr,
    pub mac: String,
}

impl Default for LinkDiagnostics {
    fn default() -> Self {
        Self {
            status_code: 0,
            ssid: String::new(),
            rssi: 0,
            ip: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
            dns: Ipv4Addr::UNSPECIFIED,
            mac: String::new(),
        }
    }
}

/// Wireless link driver
///
/// Methods never fail: link state is observed through [`Link::is_up`], not
/// raised as errors.
pub trait Link: Send + Sync {
    /// Put the radio in station mode and set the hostname
    fn configure(&mut self, hostname: &str);

    /// Start joining the network; completion is observed with `is_up`
    fn begin(&mut self, ssid: &str, password: &str);

    /// Whether the link currently has layer-3 reachability
    fn is_up(&self) -> bool;

    /// Drop the association
    fn tear_down(&mut self);

    /// Snapshot of the driver's view of the link
    fn diagnostics(&self) -> LinkDiagnostics;
}

/// One POST as handed to the transport
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
    pub timeout: Duration,
}

impl HttpRequest {
    /// Value of the first header matching `name`, ignoring ASCII case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status code and body of one exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// HTTP status, or a [`codes`] value `<= 0` on transport failure
    pub code: i32,
    pub body: Bytes,
}

impl HttpReply {
    pub fn new(code: i32, body: impl Into<Bytes>) -> Self {
        Self {
            code,
            body: body.into(),
        }
    }

    /// Reply for an exchange that never produced an HTTP status
    pub fn transport_failure(code: i32) -> Self {
        debug_assert!(code <= 0, "transport failure codes are non-positive");
        Self {
            code,
            body: Bytes::new(),
        }
    }
}

/// HTTP client capability
///
/// Implementations release their connection before returning, on every path.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(&self, request: &HttpRequest) -> HttpReply;
}
