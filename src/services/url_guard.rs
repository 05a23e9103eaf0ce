//! SSRF guard for caller-supplied media URLs.
//!
//! A URL is accepted only if every address its host resolves to is a public
//! unicast address. Resolution goes through [`HostResolver`] so tests can run
//! without network access.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use async_trait::async_trait;
use url::{Host, Url};

/// Resolves a host name to all of its A and AAAA addresses.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<IpAddr>>;
}

/// DNS resolution through the system resolver.
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.map(|a| a.ip()).collect())
    }
}

/// Validates that URLs point at public, non-internal hosts.
pub struct UrlGuard {
    resolver: Arc<dyn HostResolver>,
}

impl UrlGuard {
    pub fn new(resolver: Arc<dyn HostResolver>) -> Self {
        Self { resolver }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemResolver))
    }

    /// Check `raw` and return the parsed URL if it is safe to fetch.
    pub async fn check(&self, raw: &str) -> Result<Url, UrlRejection> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(UrlRejection::Empty);
        }

        let url = Url::parse(raw).map_err(|_| UrlRejection::Malformed)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(UrlRejection::Scheme(url.scheme().to_string()));
        }

        let host = url.host().ok_or(UrlRejection::MissingHost)?;
        let port = url.port_or_known_default().unwrap_or(443);

        let addrs = match host {
            Host::Ipv4(ip) => vec![IpAddr::V4(ip)],
            Host::Ipv6(ip) => vec![IpAddr::V6(ip)],
            Host::Domain(name) => {
                let name = name.trim_end_matches('.').to_ascii_lowercase();
                if name == "localhost" || name.ends_with(".localhost") {
                    return Err(UrlRejection::Localhost);
                }
                self.resolver
                    .resolve(&name, port)
                    .await
                    .map_err(|_| UrlRejection::Unresolvable)?
            }
        };

        if addrs.is_empty() {
            return Err(UrlRejection::Unresolvable);
        }
        if let Some(ip) = addrs.iter().find(|ip| !is_public(ip)) {
            tracing::debug!(url = %url, address = %ip, "URL resolves to non-public address");
            return Err(UrlRejection::NonPublicAddress);
        }

        Ok(url)
    }
}

/// True for globally routable unicast addresses.
pub fn is_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => is_public_v6(v6),
    }
}

fn is_public_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    let restricted = ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_broadcast()
        || ip.is_unspecified()
        || ip.is_documentation()
        // 0.0.0.0/8 "this network"
        || a == 0
        // 100.64.0.0/10 shared address space
        || (a == 100 && (b & 0xc0) == 64)
        // 192.0.0.0/24 protocol assignments
        || (a == 192 && b == 0 && c == 0)
        // 198.18.0.0/15 benchmarking
        || (a == 198 && (b & 0xfe) == 18)
        // 240.0.0.0/4 reserved
        || a >= 240;
    !restricted
}

fn is_public_v6(ip: &Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_public_v4(&v4);
    }
    let segments = ip.segments();
    // ::a.b.c.d (deprecated IPv4-compatible)
    if segments[..6].iter().all(|s| *s == 0) && !ip.is_loopback() && !ip.is_unspecified() {
        let [a, b] = segments[6].to_be_bytes();
        let [c, d] = segments[7].to_be_bytes();
        return is_public_v4(&Ipv4Addr::new(a, b, c, d));
    }
    let restricted = ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (segments[0] & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (segments[0] & 0xffc0) == 0xfe80
        // 2001:db8::/32 documentation
        || (segments[0] == 0x2001 && segments[1] == 0x0db8)
        // 100::/64 discard
        || (segments[0] == 0x0100 && segments[1..4].iter().all(|s| *s == 0));
    !restricted
}

/// Reason a URL was refused. Every variant is a client fault.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UrlRejection {
    #[error("url is required")]
    Empty,

    #[error("url is malformed")]
    Malformed,

    #[error("unsupported url scheme: {0}")]
    Scheme(String),

    #[error("url has no host")]
    MissingHost,

    #[error("url host is not allowed")]
    Localhost,

    #[error("url host is not allowed")]
    Unresolvable,

    #[error("url host is not allowed")]
    NonPublicAddress,
}
