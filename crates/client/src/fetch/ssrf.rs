//! SSRF gate for image fetches.
//!
//! Image URLs come from third-party page metadata, so the fetcher refuses
//! any host that is, or resolves to, a private, internal, or reserved
//! address.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

/// Error type for SSRF validation failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SsrfError {
    #[error("blocked host: {0}")]
    BlockedHost(String),

    #[error("blocked IP: {0} (private/reserved)")]
    BlockedIp(IpAddr),

    #[error("DNS resolution failed: {0}")]
    DnsError(String),
}

fn blocked_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_broadcast()
        || ip.is_unspecified()
        || ip.is_documentation()
        || a == 0
        // carrier-grade NAT, 100.64.0.0/10
        || (a == 100 && (b & 0xc0) == 64)
}

fn blocked_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return blocked_v4(v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_multicast()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
}

/// Whether an address is private, reserved, or otherwise not fetchable.
pub fn is_private_or_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => blocked_v4(v4),
        IpAddr::V6(v6) => blocked_v6(v6),
    }
}

pub fn validate_ip(ip: IpAddr) -> Result<(), SsrfError> {
    if is_private_or_reserved(ip) { Err(SsrfError::BlockedIp(ip)) } else { Ok(()) }
}

/// Check the literal host of a URL without touching DNS.
///
/// Returns the domain name still to be resolved, or `None` when the host
/// was an IP literal that passed.
pub fn check_host(url: &Url) -> Result<Option<String>, SsrfError> {
    match url.host() {
        Some(Host::Ipv4(ip)) => validate_ip(IpAddr::V4(ip)).map(|_| None),
        Some(Host::Ipv6(ip)) => validate_ip(IpAddr::V6(ip)).map(|_| None),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") || domain.ends_with(".internal") {
                return Err(SsrfError::BlockedHost(domain));
            }
            Ok(Some(domain))
        }
        None => Err(SsrfError::BlockedHost(String::new())),
    }
}

/// Resolve `domain` and require every answer to be public.
pub async fn resolve_public(domain: &str, port: u16) -> Result<(), SsrfError> {
    let addrs = tokio::net::lookup_host((domain, port))
        .await
        .map_err(|e| SsrfError::DnsError(e.to_string()))?;

    let mut any = false;
    for addr in addrs {
        validate_ip(addr.ip())?;
        any = true;
    }
    if any { Ok(()) } else { Err(SsrfError::DnsError(format!("no addresses for {domain}"))) }
}
