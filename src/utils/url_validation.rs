//! Endpoint URL validation
//!
//! The token endpoint receives the long-lived credential and the realtime
//! endpoint receives the ephemeral one, so both must use an encrypted scheme
//! unless they point at a loopback host (local development backends) or
//! plain-text transport has been explicitly allowed.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Errors that can occur during URL validation
#[derive(Debug, Error)]
pub enum UrlValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(#[from] url::ParseError),

    #[error("Unsupported URL scheme '{scheme}', expected one of: {expected}")]
    UnsupportedScheme { scheme: String, expected: String },

    #[error("Plain-text scheme '{0}' is only allowed for loopback hosts")]
    InsecureScheme(String),

    #[error("URL must have a host")]
    MissingHost,
}

/// Checks if an IPv4 address is a loopback address (127.0.0.0/8)
pub fn is_loopback_ipv4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback()
}

/// Checks if an IPv6 address is loopback (::1) or an IPv4-mapped loopback
pub fn is_loopback_ipv6(ip: &Ipv6Addr) -> bool {
    if ip.is_loopback() {
        return true;
    }
    if let Some(ipv4) = ip.to_ipv4_mapped() {
        return is_loopback_ipv4(&ipv4);
    }
    false
}

/// Checks whether a URL host refers to the local machine
pub fn is_loopback_host(host: &url::Host<&str>) -> bool {
    match host {
        url::Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        url::Host::Ipv4(ip) => is_loopback_ipv4(ip),
        url::Host::Ipv6(ip) => is_loopback_ipv6(ip),
    }
}

/// Checks if an IP address is loopback
pub fn is_loopback_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => is_loopback_ipv4(ipv4),
        IpAddr::V6(ipv6) => is_loopback_ipv6(ipv6),
    }
}

fn validate_scheme(
    url_str: &str,
    secure: &str,
    plain: &str,
    allow_insecure: bool,
) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;
    let scheme = url.scheme().to_string();

    if scheme != secure && scheme != plain {
        return Err(UrlValidationError::UnsupportedScheme {
            scheme,
            expected: format!("{secure}, {plain}"),
        });
    }

    let host = url.host().ok_or(UrlValidationError::MissingHost)?;

    if scheme == plain && !is_loopback_host(&host) {
        if !allow_insecure {
            return Err(UrlValidationError::InsecureScheme(scheme));
        }
        warn!(
            "Using plain-text {} endpoint {} (insecure URLs allowed)",
            scheme, url_str
        );
    }

    Ok(url)
}

/// Validates the token-issuing backend endpoint (http or https)
///
/// # Arguments
/// * `url` - The URL string to validate
/// * `allow_insecure` - Accept `http` for non-loopback hosts
pub fn validate_token_endpoint(url: &str, allow_insecure: bool) -> Result<Url, UrlValidationError> {
    validate_scheme(url, "https", "http", allow_insecure)
}

/// Validates the realtime WebSocket endpoint (ws or wss)
///
/// # Arguments
/// * `url` - The URL string to validate
/// * `allow_insecure` - Accept `ws` for non-loopback hosts
pub fn validate_realtime_url(url: &str, allow_insecure: bool) -> Result<Url, UrlValidationError> {
    validate_scheme(url, "wss", "ws", allow_insecure)
}
