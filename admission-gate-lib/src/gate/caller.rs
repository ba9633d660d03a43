//! Caller identity extraction from request headers.

use http::HeaderMap;
use ipnet::IpNet;
use std::net::{IpAddr, SocketAddr};

use crate::admission::{normalize_ip, CallerIdentity, Principal};
use crate::config::IdentityConfig;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

fn is_trusted(peer: IpAddr, trusted: &[IpNet]) -> bool {
    trusted.iter().any(|net| net.contains(&peer))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Client address: the first X-Forwarded-For hop when the peer is a trusted
/// proxy, the socket peer otherwise.
pub fn client_ip(peer: SocketAddr, headers: &HeaderMap, trusted: &[IpNet]) -> IpAddr {
    let peer_ip = normalize_ip(peer.ip());
    if !is_trusted(peer_ip, trusted) {
        return peer_ip;
    }
    header_str(headers, X_FORWARDED_FOR)
        .and_then(|xff| xff.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok())
        .map(normalize_ip)
        .unwrap_or(peer_ip)
}

/// Build the caller identity for a request.
///
/// Subject and role headers are only honoured from trusted peers; a request
/// carrying neither is anonymous.
pub fn caller_identity(
    peer: SocketAddr,
    headers: &HeaderMap,
    config: &IdentityConfig,
) -> CallerIdentity {
    let ip = client_ip(peer, headers, &config.trusted_proxies);
    if !is_trusted(normalize_ip(peer.ip()), &config.trusted_proxies) {
        return CallerIdentity::anonymous(ip);
    }

    let subject = header_str(headers, &config.subject_header);
    let roles = header_str(headers, &config.roles_header);
    if subject.is_none() && roles.is_none() {
        return CallerIdentity::anonymous(ip);
    }

    let claims = roles.into_iter().flat_map(|r| r.split(','));
    let principal = Principal::from_claims(subject.unwrap_or_default(), claims);
    CallerIdentity::authenticated(Some(ip), principal)
}
