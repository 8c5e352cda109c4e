//! Outbound HTTP safety controls for upstream calls.
//!
//! The API domain comes from the relay (which copies it from the OAuth token response), so it
//! is checked before every call rather than trusted blindly.

use crate::error::UpstreamError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tokio::net::lookup_host;
use url::Url;

/// Host suffixes Zoho Books API domains live under.
pub const ZOHO_API_HOST_SUFFIXES: &[&str] = &[
    "zohoapis.com",
    "zohoapis.eu",
    "zohoapis.in",
    "zohoapis.com.au",
    "zohoapis.jp",
    "zohoapis.ca",
    "zohoapis.com.cn",
    "zohoapis.sa",
];

#[derive(Debug, Clone)]
pub struct UpstreamSafety {
    /// If set, the URL host must equal or be a subdomain of one of these suffixes.
    pub allowed_host_suffixes: Option<Vec<String>>,
    /// If true, allow private/loopback/link-local/reserved destination IPs.
    pub allow_private_networks: bool,
    /// Maximum response body size (bytes). `None` = unlimited.
    pub max_response_bytes: Option<usize>,
}

impl UpstreamSafety {
    /// Only Zoho API hosts on public addresses, 4 MiB response cap.
    #[must_use]
    pub fn zoho_default() -> Self {
        Self {
            allowed_host_suffixes: Some(
                ZOHO_API_HOST_SUFFIXES
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect(),
            ),
            allow_private_networks: false,
            max_response_bytes: Some(4 * 1024 * 1024),
        }
    }

    /// Any host, any network. Used for local development against mock upstreams.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            allowed_host_suffixes: None,
            allow_private_networks: true,
            max_response_bytes: None,
        }
    }

    /// Validate a URL before making an outbound request.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme is not `http(s)`, the host is outside the allowed
    /// suffixes, or the host resolves to a disallowed IP range.
    pub async fn check_url(&self, url: &Url) -> Result<(), UpstreamError> {
        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(UpstreamError::InvalidUrl(format!(
                "Outbound HTTP blocked: unsupported URL scheme '{scheme}'"
            )));
        }

        let Some(host) = url.host_str() else {
            return Err(UpstreamError::InvalidUrl(
                "Outbound HTTP blocked: missing URL host".to_string(),
            ));
        };
        let host = host.to_ascii_lowercase();

        if let Some(suffixes) = &self.allowed_host_suffixes
            && !suffixes.iter().any(|s| host_matches_suffix(&host, s))
        {
            return Err(UpstreamError::InvalidUrl(format!(
                "Outbound HTTP blocked: host '{host}' is not a Zoho API host"
            )));
        }

        if self.allow_private_networks {
            return Ok(());
        }

        if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
            return if is_denied_ip(ip) {
                Err(UpstreamError::InvalidUrl(format!(
                    "Outbound HTTP blocked: destination IP '{ip}' is not allowed"
                )))
            } else {
                Ok(())
            };
        }

        let port = url.port_or_known_default().unwrap_or(443);
        let addrs = lookup_host((host.as_str(), port)).await.map_err(|e| {
            UpstreamError::Request(format!("DNS lookup failed for host '{host}': {e}"))
        })?;

        let mut saw_any = false;
        for addr in addrs {
            saw_any = true;
            if is_denied_ip(addr.ip()) {
                return Err(UpstreamError::InvalidUrl(format!(
                    "Outbound HTTP blocked: host '{host}' resolved to disallowed IP '{}'",
                    addr.ip()
                )));
            }
        }

        if !saw_any {
            return Err(UpstreamError::Request(format!(
                "DNS lookup returned no addresses for host '{host}'"
            )));
        }

        Ok(())
    }
}

fn host_matches_suffix(host: &str, suffix: &str) -> bool {
    let suffix = suffix.trim_start_matches('.').to_ascii_lowercase();
    host == suffix || host.ends_with(&format!(".{suffix}"))
}

/// Strip credentials, query and fragment from a URL for logging.
#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

/// Render a reqwest error without leaking query strings (which carry `organization_id`).
#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}

fn is_denied_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_denied_ipv4(v4),
        IpAddr::V6(v6) => is_denied_ipv6(v6),
    }
}

fn is_denied_ipv4(ip: Ipv4Addr) -> bool {
    if ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
    {
        return true;
    }

    // CGNAT and reserved ranges.
    let oct = ip.octets();
    (oct[0] == 100 && (64..=127).contains(&oct[1])) || oct[0] >= 240
}

fn is_denied_ipv6(ip: Ipv6Addr) -> bool {
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || ip.is_unique_local()
        || ip.is_unicast_link_local()
}
