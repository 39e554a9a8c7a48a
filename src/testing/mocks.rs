//! Mock implementations for testing
//!
//! Every mock is a cheap `Clone` handle over shared state, so a test can hand
//! one copy to the node and keep another to script behavior and inspect what
//! happened.

use crate::clock::{Clock, SystemProbe};
use crate::observability::DebugSink;
use crate::transport::{HttpReply, HttpRequest, HttpTransport, Link, LinkDiagnostics};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct ClockState {
    now: u64,
    sleeps: Vec<u64>,
}

/// Virtual clock; `sleep_ms` advances time instantly
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    state: Arc<Mutex<ClockState>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(now: u64) -> Self {
        let clock = Self::new();
        clock.set(now);
        clock
    }

    pub fn advance(&self, ms: u64) {
        lock(&self.state).now += ms;
    }

    pub fn set(&self, now: u64) {
        lock(&self.state).now = now;
    }

    /// Every duration passed to `sleep_ms`, in order
    pub fn sleeps(&self) -> Vec<u64> {
        lock(&self.state).sleeps.clone()
    }

    pub fn total_slept(&self) -> u64 {
        lock(&self.state).sleeps.iter().sum()
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        lock(&self.state).now
    }

    async fn sleep_ms(&self, ms: u64) {
        let mut state = lock(&self.state);
        state.now += ms;
        state.sleeps.push(ms);
    }
}

#[derive(Debug)]
struct LinkState {
    up_after_ms: Option<u64>,
    begun_at: Option<u64>,
    forced_down: bool,
    ssid: String,
    hostname: Option<String>,
    configure_count: u32,
    begin_count: u32,
    tear_down_count: u32,
    rssi: i32,
    ip: Ipv4Addr,
    gateway: Ipv4Addr,
    dns: Ipv4Addr,
    mac: String,
}

/// Link that comes up a fixed time after `begin`
///
/// `drop_link` and `restore_link` simulate the driver losing and regaining
/// the association without any call from the node.
#[derive(Debug, Clone)]
pub struct MockLink {
    clock: MockClock,
    state: Arc<Mutex<LinkState>>,
}

impl MockLink {
    /// Link that comes up immediately on `begin`
    pub fn new(clock: MockClock) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(LinkState {
                up_after_ms: Some(0),
                begun_at: None,
                forced_down: false,
                ssid: String::new(),
                hostname: None,
                configure_count: 0,
                begin_count: 0,
                tear_down_count: 0,
                rssi: -61,
                ip: Ipv4Addr::new(192, 168, 1, 20),
                gateway: Ipv4Addr::new(192, 168, 1, 1),
                dns: Ipv4Addr::new(192, 168, 1, 1),
                mac: "24:6F:28:AA:BB:CC".to_string(),
            })),
        }
    }

    /// `None` keeps the link down forever
    pub fn with_up_after(self, up_after_ms: Option<u64>) -> Self {
        lock(&self.state).up_after_ms = up_after_ms;
        self
    }

    pub fn with_gateway(self, gateway: Ipv4Addr) -> Self {
        lock(&self.state).gateway = gateway;
        self
    }

    pub fn with_rssi(self, rssi: i32) -> Self {
        lock(&self.state).rssi = rssi;
        self
    }

    pub fn drop_link(&self) {
        lock(&self.state).forced_down = true;
    }

    pub fn restore_link(&self) {
        lock(&self.state).forced_down = false;
    }

    pub fn hostname(&self) -> Option<String> {
        lock(&self.state).hostname.clone()
    }

    pub fn configure_count(&self) -> u32 {
        lock(&self.state).configure_count
    }

    pub fn begin_count(&self) -> u32 {
        lock(&self.state).begin_count
    }

    pub fn tear_down_count(&self) -> u32 {
        lock(&self.state).tear_down_count
    }
}

impl Link for MockLink {
    fn configure(&mut self, hostname: &str) {
        let mut state = lock(&self.state);
        state.hostname = Some(hostname.to_string());
        state.configure_count += 1;
    }

    fn begin(&mut self, ssid: &str, _password: &str) {
        let now = self.clock.now_ms();
        let mut state = lock(&self.state);
        state.ssid = ssid.to_string();
        state.begun_at = Some(now);
        state.forced_down = false;
        state.begin_count += 1;
    }

    fn is_up(&self) -> bool {
        let now = self.clock.now_ms();
        let state = lock(&self.state);
        match (state.begun_at, state.up_after_ms) {
            (Some(begun), Some(after)) => !state.forced_down && now.saturating_sub(begun) >= after,
            _ => false,
        }
    }

    fn tear_down(&mut self) {
        let mut state = lock(&self.state);
        state.begun_at = None;
        state.tear_down_count += 1;
    }

    fn diagnostics(&self) -> LinkDiagnostics {
        let up = self.is_up();
        let state = lock(&self.state);
        LinkDiagnostics {
            status_code: if up { 3 } else { 6 },
            ssid: state.ssid.clone(),
            rssi: state.rssi,
            ip: if up { state.ip } else { Ipv4Addr::UNSPECIFIED },
            gateway: if up { state.gateway } else { Ipv4Addr::UNSPECIFIED },
            dns: if up { state.dns } else { Ipv4Addr::UNSPECIFIED },
            mac: state.mac.clone(),
        }
    }
}

#[derive(Debug)]
struct HttpState {
    replies: VecDeque<HttpReply>,
    default_reply: HttpReply,
    requests: Vec<HttpRequest>,
}

/// Scripted HTTP transport that records every request
///
/// Replies are served from a queue; once it is empty the default reply
/// (200 with an empty body unless changed) is returned.
#[derive(Debug, Clone)]
pub struct MockHttpTransport {
    state: Arc<Mutex<HttpState>>,
}

impl Default for MockHttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHttpTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HttpState {
                replies: VecDeque::new(),
                default_reply: HttpReply::new(200, ""),
                requests: Vec::new(),
            })),
        }
    }

    pub fn with_default_reply(self, code: i32, body: &'static str) -> Self {
        lock(&self.state).default_reply = HttpReply::new(code, body);
        self
    }

    pub fn push_reply(&self, code: i32, body: &'static str) {
        lock(&self.state).replies.push_back(HttpReply::new(code, body));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.state).requests.clone()
    }

    pub fn bodies(&self) -> Vec<String> {
        lock(&self.state)
            .requests
            .iter()
            .map(|r| r.body.clone())
            .collect()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.state).requests.len()
    }

    pub fn clear_history(&self) {
        lock(&self.state).requests.clear();
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn post(&self, request: &HttpRequest) -> HttpReply {
        let mut state = lock(&self.state);
        state.requests.push(request.clone());
        match state.replies.pop_front() {
            Some(reply) => reply,
            None => state.default_reply.clone(),
        }
    }
}

/// Sink that keeps every line in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.lines).len()
    }

    pub fn contains(&self, needle: &str) -> bool {
        lock(&self.lines).iter().any(|l| l.contains(needle))
    }
}

impl DebugSink for MemorySink {
    fn line(&self, line: &str) {
        lock(&self.lines).push(line.to_string());
    }
}

/// Probe reporting a constant free-memory figure
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub u32);

impl Default for FixedProbe {
    fn default() -> Self {
        Self(180_000)
    }
}

impl SystemProbe for FixedProbe {
    fn free_memory(&self) -> u32 {
        self.0
    }
}
