//! HTTP front for the admission manager.
//!
//! The gate answers one question per request, in the style of an
//! `auth_request` subrequest: may this call proceed? `204` admits, `429`
//! (with `Retry-After`) rejects on quota, `403` refuses a caller without a
//! configured role, `500` flags a route pointing at an unknown policy.

pub mod caller;
pub mod handler;
pub mod response;
pub mod server;

pub use caller::{caller_identity, client_ip};
pub use handler::{admit, GateState};
pub use server::{run, serve, shutdown_signal};
