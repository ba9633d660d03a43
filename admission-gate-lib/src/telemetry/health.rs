use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Bytes;
use hyper::Response;
use hyper::StatusCode;
use serde_json::{json, Value};

use crate::admission::AdmissionManager;
use crate::error::{GateError, Result};

type RespBody = BoxBody<Bytes, hyper::Error>;

fn json_response(status: StatusCode, body: &Value, what: &str) -> Result<Response<RespBody>> {
    let body_bytes = serde_json::to_vec(body)
        .map_err(|e| GateError::Http(format!("Failed to serialize {what} response: {e}")))?;

    let body = Full::new(Bytes::from(body_bytes))
        .map_err(|never| match never {})
        .boxed();

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(body)
        .map_err(|e| GateError::Http(format!("Failed to build {what} response: {e}")))
}

/// Health check response - always returns 200 if process is running
pub fn health_check_response() -> Result<Response<RespBody>> {
    json_response(StatusCode::OK, &json!({"status": "healthy"}), "health")
}

/// Readiness check - verifies that policies are loaded and the manager is accepting work
/// Returns 200 when ready, 503 otherwise
pub fn ready_check_response(manager: &AdmissionManager) -> Result<Response<RespBody>> {
    if manager.registry().is_empty() {
        return json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &json!({"status": "not_ready", "reason": "no_policies_configured"}),
            "ready",
        );
    }
    if manager.controller().is_closed() {
        return json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &json!({"status": "not_ready", "reason": "shutting_down"}),
            "ready",
        );
    }
    json_response(
        StatusCode::OK,
        &json!({
            "status": "ready",
            "policies": manager.registry().policy_names(),
            "partitions": manager.controller().partition_count(),
        }),
        "ready",
    )
}

/// Liveness check - always returns 200 if process is running
pub fn live_check_response() -> Result<Response<RespBody>> {
    json_response(StatusCode::OK, &json!({"status": "alive"}), "live")
}
