#![forbid(unsafe_code)]

pub mod admission;
pub mod config;
pub mod error;
pub mod gate;
pub mod telemetry;

pub use admission::{AdmissionManager, CallerIdentity, Decision, Policy, PolicyRegistry, Role};
pub use config::{load_from_path, load_from_str, Config, Route};
pub use error::{AdmissionError, GateError, Result};
pub use gate::{run, serve, GateState};
