//! Request admission control.
//!
//! Decides whether a request may proceed under a named quota policy.
//!
//! # Architecture
//!
//! 1. **PolicyRegistry** (`registry.rs`): named fixed-window policies, plus
//!    role-based policies that pick a sub-policy from the caller's role.
//!
//! 2. **PartitionKeyResolver** (`partition.rs`): maps a caller to the
//!    partition its quota is tracked under (role, IP, or `anonymous`).
//!
//! 3. **AdmissionController** (`controller.rs`): per-partition fixed-window
//!    counters with an optional bounded wait queue.
//!
//! 4. **AdmissionManager** (`manager.rs`): the injected service tying the
//!    three together, with a background sweeper and explicit shutdown.
//!
//! # Example Usage
//!
//! ```ignore
//! use admission_gate_lib::admission::*;
//! use std::time::Duration;
//!
//! let mut registry = PolicyRegistry::new();
//! registry.register(Policy::new("readCommon", 100, Duration::from_secs(60)))?;
//! let manager = AdmissionManager::new(registry, &Default::default());
//!
//! match manager.evaluate("readCommon", &caller, tokio::time::Instant::now())? {
//!     Decision::Allowed => { /* handle request */ }
//!     Decision::Queued(ticket) => { let _ = ticket.wait().await; }
//!     Decision::Rejected { retry_after } => { /* 429 + Retry-After */ }
//! }
//! ```

mod controller;
mod identity;
mod manager;
mod partition;
mod policy;
mod registry;

pub use controller::{
    AdmissionController, Decision, QueuedAdmission, QuotaSnapshot, SweepReport,
    DEFAULT_IDLE_WINDOWS,
};
pub use identity::{CallerIdentity, Principal, Role};
pub use manager::AdmissionManager;
pub use partition::{normalize_ip, PartitionKey, PartitionKeyResolver};
pub use policy::{Policy, QueueOrder};
pub use registry::{PolicyRegistry, RolePolicy};
