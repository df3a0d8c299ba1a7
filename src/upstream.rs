use crate::config::{RelayMode, UpstreamConfig};
use crate::error::ProxyError;
use bytes::Bytes;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const MESSAGES_PATH: &str = "/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Timeout,
    Network,
    Body,
}

#[derive(Debug, Clone)]
pub struct UpstreamCallError {
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl UpstreamCallError {
    pub fn new(kind: UpstreamErrorKind, message: String) -> Self {
        Self { kind, message }
    }

    fn timeout() -> Self {
        Self::new(UpstreamErrorKind::Timeout, "timed out".to_string())
    }

    /// Maps the failure onto the caller-facing error. Buffered deployments
    /// report an unreachable upstream as 502; streaming ones as 500.
    pub fn into_proxy_error(self, mode: RelayMode) -> ProxyError {
        match (self.kind, mode) {
            (UpstreamErrorKind::Timeout, _) => ProxyError::Timeout,
            (UpstreamErrorKind::Network, RelayMode::Buffer) => ProxyError::Unreachable(self.message),
            (UpstreamErrorKind::Network, RelayMode::Stream) | (UpstreamErrorKind::Body, _) => {
                ProxyError::Transport(self.message)
            }
        }
    }
}

/// Per-call deadline. A timer task cancels the token once the timeout
/// elapses; dropping the guard aborts the timer so it can never fire after
/// the call has settled.
#[derive(Debug)]
pub struct TimeoutGuard {
    token: CancellationToken,
    timer: JoinHandle<()>,
}

impl TimeoutGuard {
    pub fn start(timeout: Duration) -> Self {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            trigger.cancel();
        });
        Self { token, timer }
    }

    #[cfg(test)]
    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Drives `fut` until it completes or the deadline fires. On timeout the
    /// future is dropped, which tears down any in-flight connection it owns.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, UpstreamCallError> {
        tokio::select! {
            biased;
            out = fut => Ok(out),
            _ = self.token.cancelled() => Err(UpstreamCallError::timeout()),
        }
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

/// Issues `POST {base_url}/v1/messages` and returns once response headers
/// arrive. Non-success statuses are returned as responses, not errors, so
/// the caller can relay them verbatim.
pub async fn send_messages(
    client: &reqwest::Client,
    config: &UpstreamConfig,
    body: &Value,
    guard: &TimeoutGuard,
) -> Result<reqwest::Response, UpstreamCallError> {
    let url = join_url(&config.base_url, MESSAGES_PATH);
    let req = client
        .post(url)
        .header("x-api-key", &config.auth_token)
        .bearer_auth(&config.auth_token)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(body);
    guard
        .run(req.send())
        .await?
        .map_err(|err| UpstreamCallError::new(UpstreamErrorKind::Network, err.to_string()))
}

/// Reads the full response body under the same deadline as the call.
pub async fn read_body(
    resp: reqwest::Response,
    guard: &TimeoutGuard,
) -> Result<Bytes, UpstreamCallError> {
    guard
        .run(resp.bytes())
        .await?
        .map_err(|err| UpstreamCallError::new(UpstreamErrorKind::Body, err.to_string()))
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let mut path = path.trim_start_matches('/');
    if base.ends_with("/v1") {
        if path == "v1" {
            path = "";
        } else if let Some(stripped) = path.strip_prefix("v1/") {
            path = stripped;
        }
    }
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}
