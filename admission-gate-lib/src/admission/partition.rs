//! Partition key derivation.

use std::fmt;
use std::net::IpAddr;

use super::identity::{CallerIdentity, Role};

const ANONYMOUS: &str = "anonymous";

/// Identifier isolating quota tracking per caller class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn anonymous() -> Self {
        Self(ANONYMOUS.to_string())
    }

    pub fn from_ip(ip: IpAddr) -> Self {
        Self(format!("ip:{}", normalize_ip(ip)))
    }

    pub fn from_role(role: Role) -> Self {
        Self(format!("role:{role}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Map IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) to plain IPv4.
pub fn normalize_ip(ip: IpAddr) -> IpAddr {
    ip.to_canonical()
}

/// Derives the partition a caller's quota is tracked under.
///
/// - authenticated callers partition by their highest-precedence role
/// - everyone else partitions by IP address
/// - with neither, the shared `anonymous` partition is used
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionKeyResolver;

impl PartitionKeyResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve_key(&self, identity: &CallerIdentity) -> PartitionKey {
        if let Some(role) = identity.primary_role() {
            return PartitionKey::from_role(role);
        }
        match identity.ip {
            Some(ip) => PartitionKey::from_ip(ip),
            None => PartitionKey::anonymous(),
        }
    }
}
