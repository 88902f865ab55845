//! Pre-fetch SSRF validation.
//!
//! Every URL is vetted here before the first request and again after each
//! redirect hop: protocol allow-list, explicit hostname block-list, literal
//! IP range checks, and finally system-DNS resolution with the same range
//! checks applied to every resolved address (DNS-rebinding defense).
//!
//! The checks are ordered cheapest-first and each failure short-circuits.

use std::net::{IpAddr, Ipv4Addr};

use thiserror::Error;
use url::Url;

/// Hostnames that never resolve to anything a crawler should touch:
/// loopback spellings and cloud metadata endpoints.
const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "ip6-localhost",
    "ip6-loopback",
    "metadata.google.internal",
    "metadata.goog",
    "instance-data",
];

/// AWS IPv6 instance-metadata address.
const AWS_METADATA_V6: &str = "fd00:ec2::254";

/// Reason a URL was refused by the guard.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SsrfBlocked {
    #[error("protocol '{0}' is not in the allow-list")]
    Protocol(String),
    #[error("URL has no hostname")]
    NoHost,
    #[error("hostname '{0}' is on the block-list")]
    Hostname(String),
    #[error("address {ip} is in blocked range: {range}")]
    BlockedRange { ip: IpAddr, range: &'static str },
    #[error("DNS resolution failed for '{host}': {message}")]
    Resolution { host: String, message: String },
}

/// Classify an address against the blocked ranges.
///
/// Returns the name of the matching range, or `None` when the address is
/// publicly routable.
#[must_use]
pub fn blocked_range(ip: IpAddr) -> Option<&'static str> {
    match ip {
        IpAddr::V4(v4) => blocked_range_v4(v4),
        IpAddr::V6(v6) => {
            // IPv4-mapped addresses smuggle a v4 target through a v6 literal.
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return blocked_range_v4(mapped);
            }
            if v6.is_loopback() {
                return Some("loopback");
            }
            if v6.to_string() == AWS_METADATA_V6 {
                return Some("cloud metadata");
            }
            let first = v6.segments()[0];
            if first & 0xfe00 == 0xfc00 {
                return Some("unique-local");
            }
            if first & 0xffc0 == 0xfe80 {
                return Some("link-local");
            }
            None
        }
    }
}

fn blocked_range_v4(ip: Ipv4Addr) -> Option<&'static str> {
    let octets = ip.octets();
    if ip == Ipv4Addr::new(169, 254, 169, 254) {
        return Some("cloud metadata");
    }
    if ip.is_loopback() {
        return Some("loopback");
    }
    if octets[0] == 10
        || (octets[0] == 172 && (16..=31).contains(&octets[1]))
        || (octets[0] == 192 && octets[1] == 168)
    {
        return Some("private");
    }
    if octets[0] == 169 && octets[1] == 254 {
        return Some("link-local");
    }
    if octets[0] == 0 {
        return Some("current-network");
    }
    if ip == Ipv4Addr::BROADCAST {
        return Some("broadcast");
    }
    None
}

/// Validate a URL before fetching it.
///
/// Returns the addresses the hostname resolved to (a single element for IP
/// literals) so callers can log what the guard actually saw.
///
/// `allow_private_networks` disables only the address-range rejection;
/// protocol and hostname checks always apply. It exists for operators
/// crawling intranet mirrors and for tests that serve fixtures on loopback.
///
/// # Errors
///
/// Returns [`SsrfBlocked`] describing the first failed check.
pub async fn validate(
    url: &Url,
    allowed_protocols: &[String],
    allow_private_networks: bool,
) -> Result<Vec<IpAddr>, SsrfBlocked> {
    let scheme = url.scheme().to_ascii_lowercase();
    if !allowed_protocols
        .iter()
        .any(|p| p.eq_ignore_ascii_case(&scheme))
    {
        return Err(SsrfBlocked::Protocol(scheme));
    }

    let host = url.host_str().ok_or(SsrfBlocked::NoHost)?;
    let host = host.trim_end_matches('.').to_ascii_lowercase();

    if BLOCKED_HOSTNAMES.contains(&host.as_str()) {
        return Err(SsrfBlocked::Hostname(host));
    }

    // Literal address: no DNS step, just the range table.
    // Bracketed IPv6 literals arrive with the brackets still on.
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        if !allow_private_networks
            && let Some(range) = blocked_range(ip)
        {
            return Err(SsrfBlocked::BlockedRange { ip, range });
        }
        return Ok(vec![ip]);
    }

    let port = url.port_or_known_default().unwrap_or(80);
    let resolved: Vec<IpAddr> = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|e| SsrfBlocked::Resolution {
            host: host.clone(),
            message: e.to_string(),
        })?
        .map(|addr| addr.ip())
        .collect();

    if resolved.is_empty() {
        return Err(SsrfBlocked::Resolution {
            host,
            message: "no addresses returned".to_string(),
        });
    }

    // One poisoned record is enough to reject: an attacker controlling DNS
    // only needs a single answer pointing inside the perimeter.
    if !allow_private_networks {
        for ip in &resolved {
            if let Some(range) = blocked_range(*ip) {
                return Err(SsrfBlocked::BlockedRange { ip: *ip, range });
            }
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocols() -> Vec<String> {
        vec!["http".to_string(), "https".to_string()]
    }

    #[tokio::test]
    async fn rejects_disallowed_protocol() {
        let url = Url::parse("ftp://example.test/file").unwrap();
        let err = validate(&url, &protocols(), false).await.unwrap_err();
        assert_eq!(err, SsrfBlocked::Protocol("ftp".to_string()));
    }

    #[tokio::test]
    async fn rejects_blocked_hostnames() {
        for host in ["localhost", "LOCALHOST", "metadata.google.internal"] {
            let url = Url::parse(&format!("http://{host}/")).unwrap();
            let err = validate(&url, &protocols(), false).await.unwrap_err();
            assert!(matches!(err, SsrfBlocked::Hostname(_)), "{host}");
        }
    }

    #[tokio::test]
    async fn rejects_private_literals() {
        for host in [
            "127.0.0.1",
            "10.0.0.5",
            "172.16.3.4",
            "172.31.255.1",
            "192.168.1.1",
            "169.254.169.254",
            "0.0.0.0",
            "255.255.255.255",
            "[::1]",
            "[fd00:ec2::254]",
            "[fe80::1]",
            "[::ffff:10.0.0.1]",
        ] {
            let url = Url::parse(&format!("http://{host}/")).unwrap();
            let err = validate(&url, &protocols(), false).await.unwrap_err();
            assert!(matches!(err, SsrfBlocked::BlockedRange { .. }), "{host}: {err:?}");
        }
    }

    #[tokio::test]
    async fn accepts_public_literals() {
        let url = Url::parse("http://93.184.216.34/").unwrap();
        let ips = validate(&url, &protocols(), false).await.unwrap();
        assert_eq!(ips, vec!["93.184.216.34".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn allow_private_networks_skips_range_checks_only() {
        let url = Url::parse("http://127.0.0.1:8080/").unwrap();
        assert!(validate(&url, &protocols(), true).await.is_ok());

        // Hostname block-list still applies.
        let url = Url::parse("http://localhost:8080/").unwrap();
        assert!(validate(&url, &protocols(), true).await.is_err());

        // And so does the protocol allow-list.
        let url = Url::parse("gopher://10.0.0.1/").unwrap();
        assert!(validate(&url, &protocols(), true).await.is_err());
    }

    #[test]
    fn range_table_edges() {
        assert_eq!(blocked_range("172.15.0.1".parse().unwrap()), None);
        assert_eq!(blocked_range("172.32.0.1".parse().unwrap()), None);
        assert_eq!(blocked_range("11.0.0.1".parse().unwrap()), None);
        assert_eq!(blocked_range("8.8.8.8".parse().unwrap()), None);
        assert_eq!(
            blocked_range("169.254.169.254".parse().unwrap()),
            Some("cloud metadata")
        );
        assert_eq!(blocked_range("169.254.0.1".parse().unwrap()), Some("link-local"));
        assert_eq!(blocked_range("fc00::1".parse().unwrap()), Some("unique-local"));
        assert_eq!(blocked_range("2001:db8::1".parse().unwrap()), None);
    }
}
