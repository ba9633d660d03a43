use ahash::AHashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::identity::{CallerIdentity, Role};
use super::policy::Policy;
use crate::config::{PolicyConfig, RolePolicyConfig};
use crate::error::AdmissionError;

/// A policy whose quota depends on the caller's role.
///
/// Each configured role gets its own sub-policy named `<policy>.<Role>`.
/// Roles without a sub-policy are refused.
#[derive(Debug, Clone)]
pub struct RolePolicy {
    name: String,
    by_role: AHashMap<Role, Arc<Policy>>,
}

impl RolePolicy {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), by_role: AHashMap::new() }
    }

    /// Attach the quota applied to callers holding `role`.
    pub fn with_role(mut self, role: Role, policy: Policy) -> Self {
        let policy = policy.renamed(format!("{}.{role}", self.name));
        self.by_role.insert(role, Arc::new(policy));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pick the sub-policy for the caller's best configured role.
    pub fn policy_for(&self, identity: &CallerIdentity) -> Result<Arc<Policy>, AdmissionError> {
        self.select(identity).map(|(_, policy)| policy)
    }

    /// Like [`policy_for`](Self::policy_for), also returning the role that matched.
    pub fn select(&self, identity: &CallerIdentity) -> Result<(Role, Arc<Policy>), AdmissionError> {
        let mut roles: Vec<Role> = identity
            .principal
            .as_ref()
            .map(|p| p.roles().iter().copied().collect())
            .unwrap_or_default();
        roles.sort_by_key(|role| std::cmp::Reverse(role.precedence()));

        roles
            .iter()
            .find_map(|role| self.by_role.get(role).map(|p| (*role, Arc::clone(p))))
            .ok_or_else(|| AdmissionError::UnauthorizedRole { policy: self.name.clone() })
    }

    fn validate(&self) -> Result<(), AdmissionError> {
        if self.by_role.is_empty() {
            return Err(AdmissionError::InvalidPolicy {
                name: self.name.clone(),
                reason: "role policy needs at least one role".to_string(),
            });
        }
        self.by_role.values().try_for_each(|p| p.validate())
    }

    /// Names of the per-role sub-policies.
    pub fn sub_policy_names(&self) -> impl Iterator<Item = &str> {
        self.by_role.values().map(|p| p.name())
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Fixed(Arc<Policy>),
    ByRole(RolePolicy),
}

/// Named admission policies.
///
/// Populated at startup, then shared behind an `Arc`; lookups take `&self`
/// and need no locking.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    entries: AHashMap<String, Entry>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the `[[policies]]` and `[[role_policies]]` tables.
    pub fn from_config(
        policies: &[PolicyConfig],
        role_policies: &[RolePolicyConfig],
    ) -> Result<Self, AdmissionError> {
        let mut registry = Self::new();
        for p in policies {
            registry.register(
                Policy::new(&p.name, p.permit_limit, Duration::from_secs(p.window_seconds))
                    .with_queue(p.queue_limit, p.queue_order),
            )?;
        }
        for rp in role_policies {
            let role_policy = rp.roles.iter().fold(RolePolicy::new(&rp.name), |acc, r| {
                acc.with_role(
                    r.role,
                    Policy::new(&rp.name, r.permit_limit, Duration::from_secs(r.window_seconds))
                        .with_queue(r.queue_limit, r.queue_order),
                )
            });
            registry.register_role_based(role_policy)?;
        }
        info!(policies = registry.len(), "admission policies registered");
        Ok(registry)
    }

    pub fn register(&mut self, policy: Policy) -> Result<(), AdmissionError> {
        policy.validate()?;
        self.insert(policy.name().to_string(), Entry::Fixed(Arc::new(policy)))
    }

    pub fn register_role_based(&mut self, policy: RolePolicy) -> Result<(), AdmissionError> {
        policy.validate()?;
        self.insert(policy.name.clone(), Entry::ByRole(policy))
    }

    /// Insert `entry`, keeping every policy and sub-policy name unique.
    ///
    /// Quota state is keyed by policy name, so a fixed policy named like a
    /// role sub-policy (`writeByRole.Admin`) would share its counters.
    fn insert(&mut self, name: String, entry: Entry) -> Result<(), AdmissionError> {
        let mut claimed = vec![name.as_str()];
        if let Entry::ByRole(rp) = &entry {
            claimed.extend(rp.sub_policy_names());
        }
        if let Some(taken) = claimed.into_iter().find(|n| self.is_taken(n)) {
            return Err(AdmissionError::DuplicatePolicy(taken.to_string()));
        }
        self.entries.insert(name, entry);
        Ok(())
    }

    fn is_taken(&self, name: &str) -> bool {
        self.entries.contains_key(name)
            || self.entries.values().any(|entry| match entry {
                Entry::ByRole(rp) => rp.sub_policy_names().any(|sub| sub == name),
                Entry::Fixed(_) => false,
            })
    }

    /// Look up a fixed policy by name.
    ///
    /// Role-based policies cannot be resolved without a caller and fail
    /// closed with [`AdmissionError::UnauthorizedRole`].
    pub fn resolve(&self, name: &str) -> Result<Arc<Policy>, AdmissionError> {
        match self.entries.get(name) {
            Some(Entry::Fixed(policy)) => Ok(Arc::clone(policy)),
            Some(Entry::ByRole(rp)) => {
                Err(AdmissionError::UnauthorizedRole { policy: rp.name.clone() })
            }
            None => Err(AdmissionError::UnknownPolicy(name.to_string())),
        }
    }

    /// Look up the policy that applies to `identity` under `name`.
    pub fn resolve_for(
        &self,
        name: &str,
        identity: &CallerIdentity,
    ) -> Result<Arc<Policy>, AdmissionError> {
        match self.entries.get(name) {
            Some(Entry::Fixed(policy)) => Ok(Arc::clone(policy)),
            Some(Entry::ByRole(rp)) => rp.policy_for(identity),
            None => Err(AdmissionError::UnknownPolicy(name.to_string())),
        }
    }

    /// Like [`resolve_for`](Self::resolve_for), also returning the role that
    /// selected the sub-policy of a role-based entry.
    pub fn resolve_with_role(
        &self,
        name: &str,
        identity: &CallerIdentity,
    ) -> Result<(Arc<Policy>, Option<Role>), AdmissionError> {
        match self.entries.get(name) {
            Some(Entry::Fixed(policy)) => Ok((Arc::clone(policy), None)),
            Some(Entry::ByRole(rp)) => rp.select(identity).map(|(role, p)| (p, Some(role))),
            None => Err(AdmissionError::UnknownPolicy(name.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn is_role_based(&self, name: &str) -> bool {
        matches!(self.entries.get(name), Some(Entry::ByRole(_)))
    }

    /// Registered names, sorted.
    pub fn policy_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
