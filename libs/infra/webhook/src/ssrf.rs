// [libs/infra/webhook/src/ssrf.rs]
/*!
 * SSRF guard (spec §4.8): any outbound URL supplied by config or admin
 * mutation is resolved and checked before the first byte leaves the
 * process. Scheme, literal address, and DNS-resolved addresses are all
 * checked — a hostname that resolves to a private range is rejected
 * exactly like a literal private IP would be.
 */

use crate::errors::WebhookError;
use reqwest::Url;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub async fn check_ssrf(raw_url: &str) -> Result<Url, WebhookError> {
    let url = Url::parse(raw_url).map_err(|e| WebhookError::MalformedUrl(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(WebhookError::SsrfRejected(format!("scheme '{other}' not allowed"))),
    }

    let host = url
        .host_str()
        .ok_or_else(|| WebhookError::MalformedUrl("url has no host".into()))?;

    if host.eq_ignore_ascii_case("localhost") {
        return Err(WebhookError::SsrfRejected("localhost is not allowed".into()));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_blocked(&ip) {
            return Err(WebhookError::SsrfRejected(format!("{ip} is in a blocked range")));
        }
        return Ok(url);
    }

    let port = url.port_or_known_default().unwrap_or(443);
    let resolved = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| WebhookError::SsrfRejected(format!("dns resolution failed: {e}")))?;

    let mut saw_any = false;
    for addr in resolved {
        saw_any = true;
        if is_blocked(&addr.ip()) {
            return Err(WebhookError::SsrfRejected(format!(
                "{host} resolves to blocked address {}",
                addr.ip()
            )));
        }
    }

    if !saw_any {
        return Err(WebhookError::SsrfRejected(format!("{host} did not resolve to any address")));
    }

    Ok(url)
}

fn is_blocked(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_blocked_v4(&mapped);
            }
            is_blocked_v6(v6)
        }
    }
}

fn is_blocked_v4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_private() // 10/8, 172.16/12, 192.168/16
        || ip.is_link_local() // 169.254/16
        || is_carrier_grade_nat(ip)
}

fn is_carrier_grade_nat(ip: &Ipv4Addr) -> bool {
    let octets = ip.octets();
    octets[0] == 100 && (octets[1] & 0b1100_0000) == 0b0100_0000 // 100.64.0.0/10
}

fn is_blocked_v6(ip: &Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    let segments = ip.segments();
    let is_unique_local = (segments[0] & 0xfe00) == 0xfc00; // fc00::/7
    let is_link_local = (segments[0] & 0xffc0) == 0xfe80; // fe80::/10
    is_unique_local || is_link_local
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_http_scheme() {
        let err = check_ssrf("ftp://example.com/").await.unwrap_err();
        assert!(matches!(err, WebhookError::SsrfRejected(_)));
    }

    #[tokio::test]
    async fn rejects_loopback_literal() {
        let err = check_ssrf("http://127.0.0.1:8080/hook").await.unwrap_err();
        assert!(matches!(err, WebhookError::SsrfRejected(_)));
    }

    #[tokio::test]
    async fn rejects_rfc1918_literal() {
        assert!(check_ssrf("https://10.0.0.5/hook").await.is_err());
        assert!(check_ssrf("https://172.16.0.5/hook").await.is_err());
        assert!(check_ssrf("https://192.168.1.5/hook").await.is_err());
    }

    #[tokio::test]
    async fn rejects_carrier_grade_nat_and_link_local() {
        assert!(check_ssrf("https://100.64.0.1/hook").await.is_err());
        assert!(check_ssrf("https://169.254.1.1/hook").await.is_err());
    }

    #[tokio::test]
    async fn rejects_ipv6_private_ranges() {
        assert!(check_ssrf("https://[::1]/hook").await.is_err());
        assert!(check_ssrf("https://[fc00::1]/hook").await.is_err());
        assert!(check_ssrf("https://[fe80::1]/hook").await.is_err());
    }

    #[tokio::test]
    async fn rejects_ipv4_mapped_ipv6_private_address() {
        let err = check_ssrf("https://[::ffff:10.0.0.5]/hook").await.unwrap_err();
        assert!(matches!(err, WebhookError::SsrfRejected(_)));
    }

    #[tokio::test]
    async fn rejects_localhost_by_name() {
        let err = check_ssrf("http://localhost/hook").await.unwrap_err();
        assert!(matches!(err, WebhookError::SsrfRejected(_)));
    }

    #[tokio::test]
    async fn rejects_malformed_url() {
        let err = check_ssrf("not a url").await.unwrap_err();
        assert!(matches!(err, WebhookError::MalformedUrl(_)));
    }

    #[tokio::test]
    async fn allows_public_ip_literal() {
        assert!(check_ssrf("https://203.0.113.10/hook").await.is_ok());
    }
}
