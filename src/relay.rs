use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::TryStreamExt;

/// CORS preflight answer: no body, permissive headers.
pub fn preflight() -> Response {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS")
        .header(header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type")
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Relays a non-success upstream answer untouched, keeping its status.
pub fn upstream_error(status: StatusCode, body: Bytes) -> Response {
    with_json_body(status, body)
}

/// Returns a fully read upstream body with the upstream status.
pub fn buffered(status: StatusCode, body: Bytes) -> Response {
    with_json_body(status, body)
}

/// Forwards the upstream body chunk by chunk as server-sent events.
pub fn stream(resp: reqwest::Response) -> Response {
    let body = resp.bytes_stream().map_err(|err| {
        tracing::warn!(error = %err, "upstream stream interrupted");
        std::io::Error::other(err)
    });
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn with_json_body(status: StatusCode, body: Bytes) -> Response {
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}
