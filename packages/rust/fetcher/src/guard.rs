//! URL validation and SSRF protection.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

use contentplan_shared::{ContentPlanError, Result};

/// Minimum host length accepted for a webpage source.
const MIN_HOST_LEN: usize = 3;

/// Most redirects followed for a single fetch.
pub const MAX_REDIRECTS: usize = 5;

/// What to do with one redirect hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectDecision {
    Follow,
    TooManyRedirects,
    /// The next hop is not a public http(s) URL.
    Refused,
}

/// Judge a redirect to `next` after `hops` requests already made.
///
/// Redirect targets get the same checks as the URL a caller passes in, so a
/// public page cannot bounce the fetch onto an internal host.
pub fn check_redirect(hops: usize, next: &Url, block_private_hosts: bool) -> RedirectDecision {
    if hops > MAX_REDIRECTS {
        return RedirectDecision::TooManyRedirects;
    }
    if !matches!(next.scheme(), "http" | "https") {
        return RedirectDecision::Refused;
    }
    if block_private_hosts && is_ssrf_target(next) {
        return RedirectDecision::Refused;
    }
    RedirectDecision::Follow
}

/// Parse and validate a webpage URL.
///
/// Only `http`/`https` with a host of at least three characters is accepted.
/// With `block_private_hosts`, loopback, private and link-local targets are
/// refused as well.
pub fn validate_url(raw: &str, block_private_hosts: bool) -> Result<Url> {
    let raw = raw.trim();
    let url = Url::parse(raw)
        .map_err(|e| ContentPlanError::invalid_source(raw, format!("not a valid URL: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ContentPlanError::invalid_source(
                raw,
                format!("unsupported scheme '{other}'"),
            ));
        }
    }

    let host_len = url.host_str().map_or(0, str::len);
    if host_len < MIN_HOST_LEN {
        return Err(ContentPlanError::invalid_source(raw, "missing or too short host"));
    }

    if block_private_hosts && is_ssrf_target(&url) {
        return Err(ContentPlanError::invalid_source(
            raw,
            "refusing to fetch a private, loopback or link-local host",
        ));
    }

    Ok(url)
}

/// Check whether a URL points at a local or internal resource.
pub fn is_ssrf_target(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain == "localhost"
                || domain.ends_with(".localhost")
                || domain.ends_with(".local")
                || domain.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_v4(&mapped);
            }
            is_private_v6(v6)
        }
    }
}

fn is_private_v4(v4: &Ipv4Addr) -> bool {
    let octets = v4.octets();
    v4.is_loopback()
        || v4.is_private()
        || v4.is_link_local()
        || v4.is_broadcast()
        || v4.is_unspecified()
        // 100.64.0.0/10 (carrier-grade NAT)
        || (octets[0] == 100 && (octets[1] & 0xC0) == 64)
        // 192.0.0.0/24
        || (octets[0] == 192 && octets[1] == 0 && octets[2] == 0)
}

fn is_private_v6(v6: &Ipv6Addr) -> bool {
    let first = v6.segments()[0];
    v6.is_loopback()
        || v6.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xFE00) == 0xFC00
        // fe80::/10 link-local
        || (first & 0xFFC0) == 0xFE80
}
