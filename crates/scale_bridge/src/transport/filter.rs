//! Origin filter for socket peers.

use std::net::{IpAddr, Ipv6Addr};

/// Returns `true` for loopback, private, link-local and IPv6 unique-local
/// addresses. IPv4-mapped IPv6 addresses are judged by their IPv4 form.
#[must_use]
pub fn is_local_origin(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_local_origin(IpAddr::V4(v4)),
            None => v6.is_loopback() || is_unique_local(v6) || is_link_local_v6(v6),
        },
    }
}

// fc00::/7
fn is_unique_local(ip: Ipv6Addr) -> bool {
    ip.segments()[0] & 0xfe00 == 0xfc00
}

// fe80::/10
fn is_link_local_v6(ip: Ipv6Addr) -> bool {
    ip.segments()[0] & 0xffc0 == 0xfe80
}
