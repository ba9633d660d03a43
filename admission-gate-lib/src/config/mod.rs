mod identity;
mod loader;
mod policy;
mod telemetry;
mod types;

pub use identity::IdentityConfig;
pub use loader::{load_from_path, load_from_str};
pub use policy::{AdmissionSettings, PolicyConfig, RolePolicyConfig, RoleQuotaConfig, Route};
pub use telemetry::{LoggingConfig, TelemetryConfig};
pub use types::{Config, TimeoutConfig};
