use serde::Deserialize;
use std::net::SocketAddr;

use super::identity::IdentityConfig;
use super::policy::{AdmissionSettings, PolicyConfig, RolePolicyConfig, Route};
use super::telemetry::{LoggingConfig, TelemetryConfig};

/// Timeout configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TimeoutConfig {
    /// Graceful shutdown timeout in seconds
    /// Default: 30
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { shutdown_secs: default_shutdown_timeout() }
    }
}

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Address and port the gate listens on
    /// Example: "0.0.0.0:8081" or "127.0.0.1:8081"
    pub listen: SocketAddr,
    /// Policy applied to requests no route matches (optional)
    /// Default: None (unmatched requests are admitted)
    #[serde(default)]
    pub default_policy: Option<String>,
    /// Fixed-window policies
    #[serde(default)]
    pub policies: Vec<PolicyConfig>,
    /// Role-based policies
    #[serde(default)]
    pub role_policies: Vec<RolePolicyConfig>,
    /// Route to policy rules, first match wins
    #[serde(default)]
    pub routes: Vec<Route>,
    /// Admission runtime settings
    #[serde(default)]
    pub admission: AdmissionSettings,
    /// Caller identity extraction
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Timeout configuration
    #[serde(default)]
    pub timeout: TimeoutConfig,
}

impl Config {
    /// Policy for a request, first matching route wins.
    pub fn policy_for(&self, method: &str, path: &str) -> Option<&str> {
        self.routes
            .iter()
            .find(|route| route.matches(method, path))
            .map(|route| route.policy.as_str())
            .or(self.default_policy.as_deref())
    }
}

fn default_shutdown_timeout() -> u64 {
    30
}
