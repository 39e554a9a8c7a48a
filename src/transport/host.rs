//! [`Link`] backed by the host's network stack
//!
//! Used when the node runs on a Linux gateway instead of a microcontroller.
//! The kernel owns association and addressing, so `begin` and `tear_down`
//! only gate whether the link is reported up. Diagnostics come from procfs
//! and sysfs; anything unreadable degrades to an empty value.

use super::{Link, LinkDiagnostics};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use tracing::debug;

/// Status code reported while the link is up
pub const LINK_STATUS_CONNECTED: i32 = 3;
/// Status code reported while the link is down
pub const LINK_STATUS_DISCONNECTED: i32 = 6;

// Documentation address; connecting a UDP socket sends no packets.
const ROUTE_PROBE_ADDR: (Ipv4Addr, u16) = (Ipv4Addr::new(192, 0, 2, 1), 9);

/// Host network link
#[derive(Debug, Default)]
pub struct HostLink {
    hostname: String,
    ssid: String,
    started: bool,
}

impl HostLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}

impl Link for HostLink {
    fn configure(&mut self, hostname: &str) {
        debug!(hostname, "Configuring host link");
        self.hostname = hostname.to_string();
    }

    fn begin(&mut self, ssid: &str, _password: &str) {
        debug!(ssid, "Host link started");
        self.ssid = ssid.to_string();
        self.started = true;
    }

    fn is_up(&self) -> bool {
        self.started && local_ipv4().is_some()
    }

    fn tear_down(&mut self) {
        debug!("Host link torn down");
        self.started = false;
    }

    fn diagnostics(&self) -> LinkDiagnostics {
        let up = self.is_up();
        let route = read("/proc/net/route").and_then(|s| parse_default_route(&s));
        let interface = route.as_ref().map(|(iface, _)| iface.clone());

        LinkDiagnostics {
            status_code: if up {
                LINK_STATUS_CONNECTED
            } else {
                LINK_STATUS_DISCONNECTED
            },
            ssid: self.ssid.clone(),
            rssi: interface
                .as_deref()
                .and_then(|iface| {
                    read("/proc/net/wireless").and_then(|s| parse_wireless_level(&s, iface))
                })
                .unwrap_or(0),
            ip: local_ipv4().unwrap_or(Ipv4Addr::UNSPECIFIED),
            gateway: route
                .map(|(_, gateway)| gateway)
                .unwrap_or(Ipv4Addr::UNSPECIFIED),
            dns: read("/etc/resolv.conf")
                .and_then(|s| parse_nameserver(&s))
                .unwrap_or(Ipv4Addr::UNSPECIFIED),
            mac: interface
                .and_then(|iface| read(&format!("/sys/class/net/{iface}/address")))
                .map(|mac| mac.trim().to_uppercase())
                .unwrap_or_default(),
        }
    }
}

fn read(path: &str) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

/// Source address the kernel would use for outbound traffic
fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(ROUTE_PROBE_ADDR).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

/// Interface and gateway of the default route in `/proc/net/route`
fn parse_default_route(table: &str) -> Option<(String, Ipv4Addr)> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 || fields[1] != "00000000" {
            return None;
        }
        let raw = u32::from_str_radix(fields[2], 16).ok()?;
        Some((fields[0].to_string(), Ipv4Addr::from(raw.to_le_bytes())))
    })
}

/// First IPv4 nameserver in `resolv.conf`
fn parse_nameserver(resolv: &str) -> Option<Ipv4Addr> {
    resolv.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("nameserver") => parts.next()?.parse().ok(),
            _ => None,
        }
    })
}

/// Signal level in dBm for `iface` from `/proc/net/wireless`
fn parse_wireless_level(table: &str, iface: &str) -> Option<i32> {
    table.lines().skip(2).find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name.trim() != iface {
            return None;
        }
        let level = rest.split_whitespace().nth(2)?;
        level.trim_end_matches('.').parse::<f32>().ok().map(|v| v as i32)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTE_TABLE: &str = "Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT\n\
wlan0\t0000A8C0\t00000000\t0001\t0\t0\t600\t00FFFFFF\t0\t0\t0\n\
wlan0\t00000000\t0101A8C0\t0003\t0\t0\t600\t00000000\t0\t0\t0\n";

    #[test]
    fn test_parse_default_route() {
        let (iface, gateway) = parse_default_route(ROUTE_TABLE).unwrap();
        assert_eq!(iface, "wlan0");
        assert_eq!(gateway, Ipv4Addr::new(192, 168, 1, 1));
    }

    #[test]
    fn test_parse_default_route_missing() {
        let table = "Iface\tDestination\tGateway\n";
        assert!(parse_default_route(table).is_none());
    }

    #[test]
    fn test_parse_nameserver_skips_comments_and_ipv6() {
        let resolv = "# generated\nsearch lan\nnameserver fe80::1\nnameserver 192.168.1.53\n";
        assert_eq!(parse_nameserver(resolv), Some(Ipv4Addr::new(192, 168, 1, 53)));
    }

    #[test]
    fn test_parse_wireless_level() {
        let table = "Inter-| sta-|   Quality        |   Discarded packets               | Missed | WE\n \
face | tus | link level noise |  nwid  crypt   frag  retry   misc | beacon | 22\n \
wlan0: 0000   54.  -56.  -256        0      0      0      0     12        0\n";
        assert_eq!(parse_wireless_level(table, "wlan0"), Some(-56));
        assert_eq!(parse_wireless_level(table, "wlan1"), None);
    }

    #[test]
    fn test_link_reports_down_until_started() {
        let mut link = HostLink::new();
        link.configure("probe");
        assert_eq!(link.hostname(), "probe");
        assert!(!link.is_up());
        link.begin("home", "pw");
        link.tear_down();
        assert!(!link.is_up());
        assert_eq!(link.diagnostics().status_code, LINK_STATUS_DISCONNECTED);
    }
}
