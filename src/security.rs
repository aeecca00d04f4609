#![forbid(unsafe_code)]

//! Shared security helpers used by the cinma binaries.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Renders a secret for logs without leaking it: the first four characters
/// followed by the total length. Short secrets are fully hidden.
pub fn mask_secret(value: &str) -> String {
    let len = value.chars().count();
    if len <= 8 {
        return format!("**** (length {len})");
    }
    let prefix: String = value.chars().take(4).collect();
    format!("{prefix}**** (length {len})")
}

/// Hosts the link checker refuses to contact so the public API cannot be used
/// to reach into the machine it runs on or its private network.
pub fn is_private_host(host: &str) -> bool {
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return true;
    }
    let lower = host.to_ascii_lowercase();
    if lower == "localhost" || lower.ends_with(".localhost") || lower.ends_with(".local") {
        return true;
    }
    match lower.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => is_private_v4(ip),
        Ok(IpAddr::V6(ip)) => is_private_v6(ip),
        Err(_) => false,
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    a == 10
        || a == 127
        || a == 0
        || (a == 169 && b == 254)
        || (a == 192 && b == 168)
        || (a == 172 && (16..=31).contains(&b))
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_v4(v4);
    }
    // fc00::/7 unique local, fe80::/10 link local
    let first = ip.segments()[0];
    (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}

/// Compares the configured admin token with the one a request carried. An
/// unset token leaves the admin routes open, matching how the deployment has
/// always behaved without `ADMIN_SYNC_TOKEN`.
pub fn tokens_match(expected: Option<&str>, provided: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    let Some(provided) = provided else {
        return false;
    };
    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
