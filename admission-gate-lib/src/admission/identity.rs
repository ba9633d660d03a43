//! Typed caller identity.
//!
//! Role claims arrive as strings from the upstream token verifier. They are
//! parsed once into [`Role`] so the rest of the admission path never
//! dispatches on raw claim text.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

/// Roles recognised by the admission layer.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    /// Back-office administrator
    Admin,
    /// Front-desk staff
    Recepcionista,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Admin, Role::Recepcionista];

    /// Parse a role claim. Matching ignores ASCII case.
    pub fn from_claim(claim: &str) -> Option<Self> {
        let claim = claim.trim();
        Self::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(claim))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Recepcionista => "Recepcionista",
        }
    }

    /// Higher wins when a caller holds several roles.
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Admin => 2,
            Self::Recepcionista => 1,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Principal {
    subject: String,
    roles: BTreeSet<Role>,
}

impl Principal {
    pub fn new(subject: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self { subject: subject.into(), roles: roles.into_iter().collect() }
    }

    /// Build a principal from raw role claims, dropping the ones not recognised.
    pub fn from_claims<'a>(
        subject: impl Into<String>,
        claims: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let subject = subject.into();
        let mut roles = BTreeSet::new();
        for claim in claims {
            match Role::from_claim(claim) {
                Some(role) => {
                    roles.insert(role);
                }
                None => debug!(subject = %subject, claim, "ignoring unrecognised role claim"),
            }
        }
        Self { subject, roles }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    /// The role with the highest precedence, if any.
    pub fn primary_role(&self) -> Option<Role> {
        self.roles.iter().copied().max_by_key(Role::precedence)
    }
}

/// Everything the admission layer knows about a caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallerIdentity {
    pub ip: Option<IpAddr>,
    pub principal: Option<Principal>,
}

impl CallerIdentity {
    pub fn anonymous(ip: IpAddr) -> Self {
        Self { ip: Some(ip), principal: None }
    }

    pub fn authenticated(ip: Option<IpAddr>, principal: Principal) -> Self {
        Self { ip, principal: Some(principal) }
    }

    pub fn primary_role(&self) -> Option<Role> {
        self.principal.as_ref().and_then(Principal::primary_role)
    }
}
