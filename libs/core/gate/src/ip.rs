// [libs/core/gate/src/ip.rs]
/*!
 * IP allowlist matching (spec §4.2 step 5): each configured entry is
 * either a bare address (exact match) or a CIDR block. An empty
 * allowlist means "no restriction" — the caller checks that before
 * invoking `matches`.
 */

use ipnet::IpNet;
use std::net::IpAddr;

pub fn matches(allowlist: &[String], client_ip: &IpAddr) -> bool {
    allowlist.iter().any(|entry| entry_matches(entry, client_ip))
}

fn entry_matches(entry: &str, client_ip: &IpAddr) -> bool {
    if let Ok(net) = entry.parse::<IpNet>() {
        return net.contains(client_ip);
    }
    if let Ok(addr) = entry.parse::<IpAddr>() {
        return &addr == client_ip;
    }
    false
}
