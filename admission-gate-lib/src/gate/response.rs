use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use http::StatusCode;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::Response;
use std::time::Duration;

pub type RespBody = BoxBody<Bytes, hyper::Error>;

pub const X_ADMISSION_POLICY: &str = "x-admission-policy";

/// `Retry-After` is whole seconds; round partial seconds up.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    }
}

fn with_policy(mut resp: Response<RespBody>, policy: Option<&str>) -> Response<RespBody> {
    if let Some(value) = policy.and_then(|p| HeaderValue::from_str(p).ok()) {
        resp.headers_mut()
            .insert(HeaderName::from_static(X_ADMISSION_POLICY), value);
    }
    resp
}

fn text(status: StatusCode, body: &'static str) -> Response<RespBody> {
    let body = Full::new(Bytes::from_static(body.as_bytes()))
        .map_err(|never| match never {})
        .boxed();
    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    resp
}

/// Request admitted: the caller proceeds with normal processing.
pub fn admitted(policy: Option<&str>) -> Response<RespBody> {
    let body = Empty::<Bytes>::new().map_err(|never| match never {}).boxed();
    let mut resp = Response::new(body);
    *resp.status_mut() = StatusCode::NO_CONTENT;
    with_policy(resp, policy)
}

pub fn too_many_requests(policy: &str, retry_after: Duration) -> Response<RespBody> {
    let mut resp = text(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests");
    resp.headers_mut().insert(
        RETRY_AFTER,
        HeaderValue::from_str(&retry_after_secs(retry_after).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("1")),
    );
    with_policy(resp, Some(policy))
}

pub fn forbidden(policy: &str) -> Response<RespBody> {
    with_policy(text(StatusCode::FORBIDDEN, "Forbidden"), Some(policy))
}

pub fn internal_error(policy: &str) -> Response<RespBody> {
    with_policy(text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"), Some(policy))
}
