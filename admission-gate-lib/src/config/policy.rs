use serde::Deserialize;

use crate::admission::{QueueOrder, Role, DEFAULT_IDLE_WINDOWS};

/// A named fixed-window policy (`[[policies]]`)
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PolicyConfig {
    /// Unique policy name referenced by routes (e.g. "readCommon")
    pub name: String,
    /// Requests admitted per window and partition
    pub permit_limit: u32,
    /// Window length in seconds
    /// Default: 60
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Callers allowed to wait for the next window once the limit is hit
    /// Default: 0 (overflow is rejected immediately)
    #[serde(default)]
    pub queue_limit: u32,
    /// Release order for queued callers: "oldest_first" or "newest_first"
    /// Default: "oldest_first"
    #[serde(default)]
    pub queue_order: QueueOrder,
}

/// A policy whose quota depends on the caller's role (`[[role_policies]]`)
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RolePolicyConfig {
    /// Unique policy name referenced by routes (e.g. "writeByRole")
    pub name: String,
    /// Quota per recognised role. Callers without a listed role are refused.
    pub roles: Vec<RoleQuotaConfig>,
}

/// Quota applied to one role inside a role policy
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RoleQuotaConfig {
    /// "Admin" or "Recepcionista"
    pub role: Role,
    pub permit_limit: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default)]
    pub queue_limit: u32,
    #[serde(default)]
    pub queue_order: QueueOrder,
}

/// Route to policy mapping (`[[routes]]`)
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Route {
    /// URL path prefix to match (e.g., "/api/ordenes")
    /// Routes are matched in order, first match wins
    pub prefix: String,
    /// HTTP methods this route applies to (e.g., ["POST", "PUT"])
    /// Default: empty (any method)
    #[serde(default)]
    pub methods: Vec<String>,
    /// Policy evaluated for matching requests
    pub policy: String,
}

impl Route {
    /// True when `path` is under `prefix` at a segment boundary and the
    /// method is listed (or no methods are listed).
    pub fn matches(&self, method: &str, path: &str) -> bool {
        self.matches_path(path)
            && (self.methods.is_empty() || self.methods.iter().any(|m| m.eq_ignore_ascii_case(method)))
    }

    fn matches_path(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || self.prefix.ends_with('/'),
            None => false,
        }
    }
}

/// Admission runtime settings (`[admission]`)
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AdmissionSettings {
    /// Interval between maintenance sweeps in milliseconds
    /// Default: 1000
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Windows of inactivity after which a partition's state is dropped
    /// Default: 10
    #[serde(default = "default_idle_windows")]
    pub idle_windows: u32,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self { sweep_interval_ms: default_sweep_interval_ms(), idle_windows: default_idle_windows() }
    }
}

fn default_window_seconds() -> u64 {
    60
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

fn default_idle_windows() -> u32 {
    DEFAULT_IDLE_WINDOWS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(prefix: &str, methods: &[&str]) -> Route {
        Route {
            prefix: prefix.to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            policy: "p".to_string(),
        }
    }

    #[test]
    fn test_route_any_method() {
        let r = route("/api/clientes", &[]);
        assert!(r.matches("GET", "/api/clientes/3"));
        assert!(r.matches("DELETE", "/api/clientes"));
        assert!(!r.matches("GET", "/api/vehiculos"));
    }

    #[test]
    fn test_route_prefix_stops_at_segment_boundary() {
        let r = route("/api", &[]);
        assert!(r.matches("GET", "/api"));
        assert!(r.matches("GET", "/api/ordenes"));
        assert!(!r.matches("GET", "/apis/ordenes"));
        assert!(!r.matches("GET", "/api-v2"));

        let slash = route("/api/", &[]);
        assert!(slash.matches("GET", "/api/ordenes"));
        assert!(!slash.matches("GET", "/api"));

        let root = route("/", &[]);
        assert!(root.matches("GET", "/anything"));
    }

    #[test]
    fn test_route_method_filter() {
        let r = route("/api", &["post", "PUT"]);
        assert!(r.matches("POST", "/api/ordenes"));
        assert!(r.matches("put", "/api/ordenes/1"));
        assert!(!r.matches("GET", "/api/ordenes"));
    }
}
