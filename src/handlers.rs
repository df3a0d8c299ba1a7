use crate::app::AppState;
use crate::config::{RelayMode, UpstreamConfig};
use crate::error::{ProxyError, ProxyResult};
use crate::{relay, request, upstream};
use axum::extract::State;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use std::time::Instant;

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

/// Entry point for `/`: preflight, method gate, then a single upstream
/// round trip relayed in the configured mode.
pub async fn proxy(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    if method == Method::OPTIONS {
        record_outcome("preflight");
        return relay::preflight();
    }
    if method != Method::POST {
        return reject(ProxyError::MethodNotAllowed);
    }

    let started = Instant::now();
    match forward(&state, &body).await {
        Ok(resp) => {
            let status = resp.status();
            record_outcome(if status.is_success() {
                "success"
            } else {
                "upstream_error"
            });
            tracing::info!(
                status = status.as_u16(),
                relay_mode = state.runtime.relay_mode.as_str(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "request relayed"
            );
            resp
        }
        Err(err) => reject(err),
    }
}

async fn forward(state: &AppState, body: &[u8]) -> ProxyResult<Response> {
    let config = UpstreamConfig::resolve(&state.runtime.upstream_env)?;
    let parsed = request::parse_body(body)?;
    let payload = request::normalize(parsed, &state.runtime.normalize_options())?;
    let mode = state.runtime.relay_mode;

    tracing::debug!(
        model = payload.get("model").and_then(|v| v.as_str()).unwrap_or(""),
        base_url = %config.base_url,
        timeout_ms = config.timeout.as_millis() as u64,
        "forwarding to upstream"
    );

    let guard = upstream::TimeoutGuard::start(config.timeout);
    let call_started = Instant::now();
    let resp = upstream::send_messages(&state.http, &config, &payload, &guard)
        .await
        .map_err(|err| err.into_proxy_error(mode))?;
    metrics::histogram!("proxy_upstream_latency_seconds")
        .record(call_started.elapsed().as_secs_f64());

    let status = resp.status();
    if !status.is_success() {
        let text = upstream::read_body(resp, &guard)
            .await
            .map_err(|err| err.into_proxy_error(mode))?;
        tracing::warn!(status = status.as_u16(), "upstream returned error status");
        return Ok(relay::upstream_error(status, text));
    }

    match mode {
        RelayMode::Stream => {
            drop(guard);
            Ok(relay::stream(resp))
        }
        RelayMode::Buffer => {
            let bytes = upstream::read_body(resp, &guard)
                .await
                .map_err(|err| err.into_proxy_error(mode))?;
            Ok(relay::buffered(status, bytes))
        }
    }
}

fn reject(err: ProxyError) -> Response {
    let status = err.status();
    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), kind = err.kind(), error = %err, "request failed");
    } else {
        tracing::debug!(status = status.as_u16(), kind = err.kind(), error = %err, "request rejected");
    }
    record_outcome(err.kind());
    err.into_response()
}

fn record_outcome(outcome: &'static str) {
    metrics::counter!("proxy_requests_total", "outcome" => outcome).increment(1);
}
