use crate::config::{EnvSource, RelayMode, UnknownFieldPolicy, ValidationMode};
use crate::error::{ProxyError, ProxyResult};
use crate::request::NormalizeOptions;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, header};
use axum::routing::{any, get};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::{Arc, Once, OnceLock};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

pub const DEFAULT_BODY_LIMIT_BYTES: usize = 6 * 1024 * 1024;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeConfig>,
    pub http: reqwest::Client,
    pub metrics: PrometheusHandle,
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static METRICS_ERROR: OnceLock<ProxyError> = OnceLock::new();
static METRICS_INIT: Once = Once::new();

/// Settings fixed at process start. Upstream credentials are not part of
/// this: they are looked up in `upstream_env` on every request.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub listen: String,
    pub metrics_path: String,
    pub relay_mode: RelayMode,
    pub validation: ValidationMode,
    pub unknown_fields: UnknownFieldPolicy,
    pub body_limit_bytes: usize,
    pub upstream_env: EnvSource,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            metrics_path: "/metrics".to_string(),
            relay_mode: RelayMode::default(),
            validation: ValidationMode::default(),
            unknown_fields: UnknownFieldPolicy::default(),
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
            upstream_env: EnvSource::Process,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_source(EnvSource::Process)
    }

    pub fn from_source(env: EnvSource) -> Self {
        let defaults = Self::default();
        let listen = env.var("PROXY_LISTEN").unwrap_or(defaults.listen);
        let metrics_path = match env.var("PROXY_METRICS_PATH") {
            Some(raw) if is_static_route(raw.trim()) => raw.trim().to_string(),
            Some(raw) => {
                tracing::warn!(
                    metrics_path = %raw,
                    "ignoring invalid metrics path, falling back to {}",
                    defaults.metrics_path
                );
                defaults.metrics_path
            }
            None => defaults.metrics_path,
        };
        Self {
            listen,
            metrics_path,
            relay_mode: env.parse_or("PROXY_RELAY_MODE", defaults.relay_mode),
            validation: env.parse_or("PROXY_VALIDATION", defaults.validation),
            unknown_fields: env.parse_or("PROXY_UNKNOWN_FIELDS", defaults.unknown_fields),
            body_limit_bytes: env.parse_or("PROXY_BODY_LIMIT_BYTES", defaults.body_limit_bytes),
            upstream_env: env,
        }
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            validation: self.validation,
            unknown_fields: self.unknown_fields,
            relay_mode: self.relay_mode,
        }
    }
}

/// Literal, non-root path that the router can register without panicking.
fn is_static_route(path: &str) -> bool {
    path.starts_with('/')
        && path != "/"
        && !path.contains(['{', '}', '*', ':'])
        && !path.contains("//")
}

pub async fn load_state() -> ProxyResult<AppState> {
    load_state_with_runtime(RuntimeConfig::from_env()).await
}

pub async fn load_state_with_runtime(runtime: RuntimeConfig) -> ProxyResult<AppState> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("claude-proxy/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|err| ProxyError::Internal(format!("http client init failed: {err}")))?;

    let metrics = init_metrics()?;

    tracing::debug!(
        relay_mode = runtime.relay_mode.as_str(),
        validation = ?runtime.validation,
        unknown_fields = ?runtime.unknown_fields,
        body_limit_bytes = runtime.body_limit_bytes,
        "proxy state initialised"
    );

    Ok(AppState {
        runtime: Arc::new(runtime),
        http,
        metrics,
    })
}

fn init_metrics() -> ProxyResult<PrometheusHandle> {
    METRICS_INIT.call_once(|| {
        match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(err) => {
                let _ = METRICS_ERROR.set(ProxyError::Internal(format!(
                    "metrics init failed: {err}"
                )));
            }
        }
    });

    if let Some(err) = METRICS_ERROR.get() {
        return Err(err.clone());
    }
    METRICS_HANDLE
        .get()
        .cloned()
        .ok_or_else(|| ProxyError::Internal("metrics recorder not available".to_string()))
}

pub fn build_app(state: AppState) -> Router {
    let metrics_path = state.runtime.metrics_path.clone();
    let body_limit = state.runtime.body_limit_bytes;
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    Router::new()
        .route("/", any(crate::handlers::proxy))
        .route(&metrics_path, get(crate::handlers::metrics))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
}
