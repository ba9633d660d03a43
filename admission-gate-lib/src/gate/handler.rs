use http::{HeaderMap, Method, Uri};
use hyper::Response;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

use super::caller::caller_identity;
use super::response::{admitted, forbidden, internal_error, too_many_requests, RespBody};
use crate::admission::{AdmissionManager, Decision};
use crate::config::Config;
use crate::error::AdmissionError;
use crate::telemetry::Metrics;

/// Shared state for every gate connection.
pub struct GateState {
    pub config: Arc<Config>,
    pub manager: Arc<AdmissionManager>,
    pub metrics: Option<Arc<Metrics>>,
}

impl GateState {
    pub fn new(config: Arc<Config>, manager: Arc<AdmissionManager>) -> Self {
        Self { config, manager, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Method and path the admission decision is about.
///
/// When the gate answers an auth subrequest, the original request line is
/// carried in headers; otherwise the gate request itself is evaluated.
fn target(method: &Method, uri: &Uri, headers: &HeaderMap, config: &Config) -> (String, String) {
    let method = headers
        .get(config.identity.original_method_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(|m| m.trim().to_ascii_uppercase())
        .unwrap_or_else(|| method.as_str().to_string());
    let path = headers
        .get(config.identity.original_uri_header.as_str())
        .and_then(|v| v.to_str().ok())
        .and_then(|u| u.parse::<Uri>().ok())
        .map(|u| u.path().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    (method, path)
}

/// Evaluate one request and translate the decision into an HTTP answer.
///
/// Queued callers are held here until released or rejected. If the client
/// goes away meanwhile, the future is dropped and the queued ticket with it.
pub async fn admit(
    state: &GateState,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    peer: SocketAddr,
) -> Response<RespBody> {
    let started = Instant::now();
    let (method, path) = target(method, uri, headers, &state.config);

    let Some(policy) = state.config.policy_for(&method, &path) else {
        debug!(%method, %path, "no admission policy for request");
        return finish(state, admitted(None), started);
    };

    let identity = caller_identity(peer, headers, &state.config.identity);
    let decision = match state.manager.evaluate(policy, &identity, started) {
        Ok(Decision::Queued(ticket)) => {
            let resolved = ticket.wait().await;
            if let Some(m) = &state.metrics {
                m.record_queue_wait(policy, resolved.as_str(), started.elapsed().as_secs_f64());
            }
            resolved
        }
        Ok(decision) => decision,
        Err(AdmissionError::UnauthorizedRole { .. }) => {
            return finish(state, forbidden(policy), started);
        }
        Err(_) => return finish(state, internal_error(policy), started),
    };

    let resp = match decision {
        Decision::Rejected { retry_after } => too_many_requests(policy, retry_after),
        _ => admitted(Some(policy)),
    };
    finish(state, resp, started)
}

fn finish(state: &GateState, resp: Response<RespBody>, started: Instant) -> Response<RespBody> {
    if let Some(m) = &state.metrics {
        m.record_request(resp.status().as_u16(), started.elapsed().as_secs_f64());
    }
    resp
}
