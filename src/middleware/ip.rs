//! Client identity resolution.
//!
//! # Header Priority
//!
//! 1. `X-Forwarded-For`, first entry of the comma-separated list
//! 2. `X-Real-IP`
//! 3. The connection peer address
//! 4. [`UNKNOWN_IDENTITY`](crate::admission::UNKNOWN_IDENTITY)
//!
//! Blank header values are skipped rather than producing an empty key.
//!
//! # Security Warning: Spoofable Headers
//!
//! **Forwarding headers are client-controlled.** A client talking to this
//! service directly can put any address it likes in `X-Forwarded-For` and
//! rotate it to dodge its quota, or frame another address into a block.
//!
//! The accepted trust boundary is deployment behind a reverse proxy or CDN
//! that overwrites these headers:
//!
//! ```nginx
//! proxy_set_header X-Real-IP $remote_addr;
//! proxy_set_header X-Forwarded-For $remote_addr;
//! ```
//!
//! Setting `TRUSTED_PROXIES` narrows it further: headers are then honored only
//! when the TCP peer falls inside one of the configured CIDR ranges, and the
//! peer address is used otherwise.
//!
//! # The "unknown" Fallback
//!
//! Requests with no headers and no peer address share a single bucket. Heavy
//! "unknown" traffic in the access log usually means a misconfigured proxy.

use std::net::{IpAddr, SocketAddr};

use axum::http::Request;
use tracing::{debug, warn};

use crate::admission::ClientIdentity;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Where an identity came from. Only used for debug logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdentitySource<'a> {
    ForwardedFor(&'a str),
    RealIp(&'a str),
    Peer(IpAddr),
    Unknown,
}

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range.
#[derive(Debug, Clone)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse `"10.0.0.0/8"`, `"::1/128"`, or a bare address (implicit /32 or
    /// /128).
    pub fn parse(cidr: &str) -> Option<Self> {
        let mut parts = cidr.trim().splitn(2, '/');
        let network: IpAddr = parts.next()?.trim().parse().ok()?;
        let max_prefix = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };

        let prefix_len = match parts.next() {
            Some(prefix) => prefix.trim().parse::<u8>().ok()?,
            None => max_prefix,
        };
        if prefix_len > max_prefix {
            return None;
        }

        Some(Self {
            network,
            prefix_len,
        })
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX
                    .checked_shl(32 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            _ => false,
        }
    }
}

/// Proxies whose forwarding headers are believed.
///
/// Empty means every peer is trusted.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
}

impl TrustedProxyConfig {
    /// Build from CIDR strings. Invalid entries are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges: Vec<CidrRange> = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        if !ranges.is_empty() {
            debug!(count = ranges.len(), "Trusted proxy validation enabled");
        }

        Self { ranges }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Whether headers from `peer` should be believed.
    pub fn trusts(&self, peer: &IpAddr) -> bool {
        self.ranges.is_empty() || self.ranges.iter().any(|range| range.contains(peer))
    }
}

// =============================================================================
// Resolution
// =============================================================================

fn header_value<'a, B>(req: &'a Request<B>, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
}

fn non_blank(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

fn from_headers<B>(req: &Request<B>) -> Option<IdentitySource<'_>> {
    if let Some(first) = header_value(req, X_FORWARDED_FOR)
        .and_then(|value| value.split(',').next())
        .and_then(non_blank)
    {
        return Some(IdentitySource::ForwardedFor(first));
    }

    header_value(req, X_REAL_IP)
        .and_then(non_blank)
        .map(IdentitySource::RealIp)
}

fn resolve_source<'a, B>(
    req: &'a Request<B>,
    peer: Option<SocketAddr>,
    trusted_proxies: &TrustedProxyConfig,
) -> IdentitySource<'a> {
    let peer_ip = peer.map(|addr| addr.ip());

    let headers_believed = match peer_ip {
        Some(ip) => trusted_proxies.trusts(&ip),
        // No peer to check against; only an empty allow-list trusts blindly
        None => !trusted_proxies.is_enabled(),
    };

    if headers_believed && let Some(source) = from_headers(req) {
        return source;
    }

    match peer_ip {
        Some(ip) => IdentitySource::Peer(ip),
        None => IdentitySource::Unknown,
    }
}

/// Derive the client identity for `req`. Never fails.
///
/// `peer` is the TCP peer when the server exposes it through `ConnectInfo`.
pub fn resolve_client_identity<B>(
    req: &Request<B>,
    peer: Option<SocketAddr>,
    trusted_proxies: &TrustedProxyConfig,
) -> ClientIdentity {
    let source = resolve_source(req, peer, trusted_proxies);
    if trusted_proxies.is_enabled() && matches!(source, IdentitySource::Peer(_)) {
        debug!(?peer, "Forwarding headers ignored or absent, using peer address");
    }

    match source {
        IdentitySource::ForwardedFor(value) | IdentitySource::RealIp(value) => {
            ClientIdentity::new(value)
        }
        IdentitySource::Peer(ip) => ClientIdentity::new(ip.to_string()),
        IdentitySource::Unknown => ClientIdentity::unknown(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn resolve(req: &Request<Body>) -> String {
        resolve_client_identity(req, None, &TrustedProxyConfig::default()).to_string()
    }

    fn peer(addr: &str) -> Option<SocketAddr> {
        Some(addr.parse().unwrap())
    }

    #[test]
    fn test_xff_first_entry() {
        let req = Request::builder()
            .header("x-forwarded-for", "192.168.1.1, 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(resolve(&req), "192.168.1.1");
    }

    #[test]
    fn test_real_ip() {
        let req = Request::builder()
            .header("x-real-ip", "192.168.1.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(resolve(&req), "192.168.1.1");
    }

    #[test]
    fn test_xff_priority_over_real_ip() {
        let req = Request::builder()
            .header("x-forwarded-for", "10.0.0.1")
            .header("x-real-ip", "192.168.1.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(resolve(&req), "10.0.0.1");
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let req = Request::builder()
            .header("x-forwarded-for", "  192.168.1.1  , 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(resolve(&req), "192.168.1.1");
    }

    #[test]
    fn test_blank_xff_falls_through_to_real_ip() {
        let req = Request::builder()
            .header("x-forwarded-for", "   ")
            .header("x-real-ip", "172.16.0.4")
            .body(Body::empty())
            .unwrap();

        assert_eq!(resolve(&req), "172.16.0.4");
    }

    #[test]
    fn test_leading_empty_xff_entry_falls_through() {
        let req = Request::builder()
            .header("x-forwarded-for", ", 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        let identity = resolve_client_identity(&req, peer("127.0.0.1:5000"), &TrustedProxyConfig::default());
        assert_eq!(identity.as_str(), "127.0.0.1");
    }

    #[test]
    fn test_peer_used_without_headers() {
        let req = Request::builder().body(Body::empty()).unwrap();

        let identity =
            resolve_client_identity(&req, peer("[2001:db8::7]:443"), &TrustedProxyConfig::default());
        assert_eq!(identity.as_str(), "2001:db8::7");
    }

    #[test]
    fn test_unknown_without_anything() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let identity = resolve_client_identity(&req, None, &TrustedProxyConfig::default());

        assert!(identity.is_unknown());
        assert_eq!(identity.as_str(), "unknown");
    }

    #[test]
    fn test_long_proxy_chain() {
        let long_chain = (0..100)
            .map(|i| format!("10.0.0.{}", i % 256))
            .collect::<Vec<_>>()
            .join(", ");

        let req = Request::builder()
            .header("x-forwarded-for", &long_chain)
            .body(Body::empty())
            .unwrap();

        assert_eq!(resolve(&req), "10.0.0.0");
    }

    #[test]
    fn test_xff_with_port_passes_through() {
        let req = Request::builder()
            .header("x-forwarded-for", "192.168.1.1:8080, 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(resolve(&req), "192.168.1.1:8080");
    }

    #[test]
    fn test_non_utf8_xff_falls_through() {
        let req = Request::builder()
            .header(
                "x-forwarded-for",
                axum::http::HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap(),
            )
            .header("x-real-ip", "192.168.1.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(resolve(&req), "192.168.1.1");
    }

    #[test]
    fn test_untrusted_peer_headers_ignored() {
        let trusted = TrustedProxyConfig::new(&["10.0.0.0/8".to_string()]);
        let req = Request::builder()
            .header("x-forwarded-for", "1.1.1.1")
            .body(Body::empty())
            .unwrap();

        let identity = resolve_client_identity(&req, peer("203.0.113.5:4000"), &trusted);
        assert_eq!(identity.as_str(), "203.0.113.5");
    }

    #[test]
    fn test_trusted_peer_headers_honored() {
        let trusted = TrustedProxyConfig::new(&["10.0.0.0/8".to_string()]);
        let req = Request::builder()
            .header("x-forwarded-for", "1.1.1.1")
            .body(Body::empty())
            .unwrap();

        let identity = resolve_client_identity(&req, peer("10.1.2.3:4000"), &trusted);
        assert_eq!(identity.as_str(), "1.1.1.1");
    }

    #[test]
    fn test_enabled_trust_without_peer_ignores_headers() {
        let trusted = TrustedProxyConfig::new(&["10.0.0.0/8".to_string()]);
        let req = Request::builder()
            .header("x-forwarded-for", "1.1.1.1")
            .body(Body::empty())
            .unwrap();

        assert!(resolve_client_identity(&req, None, &trusted).is_unknown());
    }

    // ==========================================================================
    // CIDR Range Tests
    // ==========================================================================

    #[test]
    fn test_cidr_parse() {
        assert_eq!(CidrRange::parse("10.0.0.0/8").unwrap().prefix_len, 8);
        assert_eq!(CidrRange::parse("::1/128").unwrap().prefix_len, 128);
        assert_eq!(CidrRange::parse("192.168.1.1").unwrap().prefix_len, 32);
        assert_eq!(CidrRange::parse("2001:db8::1").unwrap().prefix_len, 128);
    }

    #[test]
    fn test_cidr_parse_invalid() {
        assert!(CidrRange::parse("not-an-ip").is_none());
        assert!(CidrRange::parse("10.0.0.0/33").is_none());
        assert!(CidrRange::parse("10.0.0.0/x").is_none());
    }

    #[test]
    fn test_cidr_contains_ipv4() {
        let cidr = CidrRange::parse("10.0.0.0/8").unwrap();

        assert!(cidr.contains(&"10.0.0.1".parse().unwrap()));
        assert!(cidr.contains(&"10.255.255.255".parse().unwrap()));
        assert!(!cidr.contains(&"11.0.0.1".parse().unwrap()));
        assert!(!cidr.contains(&"::1".parse().unwrap()));
    }

    #[test]
    fn test_cidr_zero_prefix_matches_all() {
        let cidr = CidrRange::parse("0.0.0.0/0").unwrap();
        assert!(cidr.contains(&"8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_trusted_proxy_config() {
        let empty = TrustedProxyConfig::new(&[]);
        assert!(!empty.is_enabled());
        assert!(empty.trusts(&"1.2.3.4".parse().unwrap()));

        let config =
            TrustedProxyConfig::new(&["10.0.0.0/8".to_string(), "bogus".to_string()]);
        assert!(config.is_enabled());
        assert!(config.trusts(&"10.0.0.1".parse().unwrap()));
        assert!(!config.trusts(&"8.8.8.8".parse().unwrap()));
    }
}
