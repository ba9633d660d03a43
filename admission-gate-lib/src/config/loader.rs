use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::{GateError, Result};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let txt = fs::read_to_string(p)
        .map_err(|e| GateError::Config(format!("Failed to read config file: {e}")))?;
    load_from_str(&txt)
}

pub fn load_from_str(txt: &str) -> Result<Config> {
    let cfg: Config =
        toml::from_str(txt).map_err(|e| GateError::Config(format!("Failed to parse config: {e}")))?;

    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> Result<()> {
    let mut names = HashSet::new();

    for policy in &cfg.policies {
        check_name(&mut names, &policy.name)?;
        check_quota(&policy.name, policy.permit_limit, policy.window_seconds)?;
    }

    for policy in &cfg.role_policies {
        check_name(&mut names, &policy.name)?;
        if policy.roles.is_empty() {
            return Err(GateError::Config(format!(
                "Role policy {} must configure at least one role",
                policy.name
            )));
        }
        let mut roles = HashSet::new();
        for quota in &policy.roles {
            if !roles.insert(quota.role) {
                return Err(GateError::Config(format!(
                    "Role policy {} configures role {} twice",
                    policy.name, quota.role
                )));
            }
            check_quota(&policy.name, quota.permit_limit, quota.window_seconds)?;
        }
    }

    // Role quotas are tracked as `<policy>.<Role>`; a plain policy of that
    // name would share their counters.
    for policy in &cfg.role_policies {
        for quota in &policy.roles {
            let sub_name = format!("{}.{}", policy.name, quota.role);
            if names.contains(sub_name.as_str()) {
                return Err(GateError::Config(format!(
                    "Policy name {sub_name} is reserved by role policy {}",
                    policy.name
                )));
            }
        }
    }

    for route in &cfg.routes {
        if !route.prefix.starts_with('/') {
            return Err(GateError::Config(format!(
                "Route prefix must start with '/': {}",
                route.prefix
            )));
        }
        if !names.contains(route.policy.as_str()) {
            return Err(GateError::Config(format!(
                "Route {} references unknown policy: {}",
                route.prefix, route.policy
            )));
        }
    }

    if let Some(default_policy) = &cfg.default_policy {
        if !names.contains(default_policy.as_str()) {
            return Err(GateError::Config(format!(
                "default_policy references unknown policy: {default_policy}"
            )));
        }
    }

    if cfg.admission.sweep_interval_ms == 0 {
        return Err(GateError::Config("sweep_interval_ms must be > 0".into()));
    }
    if cfg.admission.idle_windows == 0 {
        return Err(GateError::Config("idle_windows must be > 0".into()));
    }

    let identity = &cfg.identity;
    for header in [
        &identity.subject_header,
        &identity.roles_header,
        &identity.original_uri_header,
        &identity.original_method_header,
    ] {
        if http::HeaderName::from_bytes(header.as_bytes()).is_err() {
            return Err(GateError::Config(format!("Invalid header name: {header}")));
        }
    }

    Ok(())
}

fn check_name<'a>(names: &mut HashSet<&'a str>, name: &'a str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(GateError::Config("Policy name cannot be empty".into()));
    }
    if !names.insert(name) {
        return Err(GateError::Config(format!("Duplicate policy name: {name}")));
    }
    Ok(())
}

fn check_quota(name: &str, permit_limit: u32, window_seconds: u64) -> Result<()> {
    if permit_limit == 0 {
        return Err(GateError::Config(format!("Policy {name}: permit_limit must be > 0")));
    }
    if window_seconds == 0 {
        return Err(GateError::Config(format!("Policy {name}: window_seconds must be > 0")));
    }
    Ok(())
}
