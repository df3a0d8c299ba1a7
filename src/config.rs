use crate::error::ProxyError;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const AUTH_TOKEN_VAR: &str = "ANTHROPIC_AUTH_TOKEN";
pub const BASE_URL_VAR: &str = "ANTHROPIC_BASE_URL";
pub const TIMEOUT_MS_VAR: &str = "API_TIMEOUT_MS";

pub const DEFAULT_BASE_URL: &str = "https://cc.580ai.net";
pub const DEFAULT_TIMEOUT_MS: u64 = 600_000;

/// How a successful upstream body is handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Forward the body as a live `text/event-stream`; upstream is asked to stream.
    Stream,
    /// Read the whole body, then answer with it in one piece.
    Buffer,
}

impl Default for RelayMode {
    fn default() -> Self {
        RelayMode::Stream
    }
}

impl RelayMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RelayMode::Stream => "stream",
            RelayMode::Buffer => "buffer",
        }
    }
}

impl FromStr for RelayMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "stream" => Ok(RelayMode::Stream),
            "buffer" => Ok(RelayMode::Buffer),
            other => Err(format!("unknown relay mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Strict,
    Lenient,
}

impl Default for ValidationMode {
    fn default() -> Self {
        ValidationMode::Strict
    }
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ValidationMode::Strict),
            "lenient" => Ok(ValidationMode::Lenient),
            other => Err(format!("unknown validation mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownFieldPolicy {
    Reject,
    Ignore,
    Preserve,
}

impl Default for UnknownFieldPolicy {
    fn default() -> Self {
        UnknownFieldPolicy::Preserve
    }
}

impl FromStr for UnknownFieldPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(UnknownFieldPolicy::Reject),
            "ignore" => Ok(UnknownFieldPolicy::Ignore),
            "preserve" => Ok(UnknownFieldPolicy::Preserve),
            other => Err(format!("unknown field policy: {other}")),
        }
    }
}

/// Where configuration variables are looked up.
///
/// `Process` reads the live process environment on every call. `Map` holds a
/// fixed set of variables and is what tests and embedders inject.
#[derive(Debug, Clone, Default)]
pub enum EnvSource {
    #[default]
    Process,
    Map(Arc<HashMap<String, String>>),
}

impl EnvSource {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let map = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<HashMap<_, _>>();
        EnvSource::Map(Arc::new(map))
    }

    /// Returns the variable if it is set and not blank.
    pub fn var(&self, name: &str) -> Option<String> {
        let value = match self {
            EnvSource::Process => std::env::var(name).ok(),
            EnvSource::Map(map) => map.get(name).cloned(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    /// Parses a variable, falling back to `default` when unset or unparseable.
    pub fn parse_or<T>(&self, name: &str, default: T) -> T
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.var(name) else {
            return default;
        };
        match raw.parse::<T>() {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(variable = name, error = %err, "ignoring invalid configuration value");
                default
            }
        }
    }
}

/// Upstream settings resolved for a single invocation.
#[derive(Clone)]
pub struct UpstreamConfig {
    pub auth_token: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("auth_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl UpstreamConfig {
    /// Reads the upstream settings, failing closed when no credential is configured.
    pub fn resolve(env: &EnvSource) -> Result<Self, ProxyError> {
        let auth_token = env
            .var(AUTH_TOKEN_VAR)
            .ok_or(ProxyError::MissingCredential(AUTH_TOKEN_VAR))?;
        let base_url = env
            .var(BASE_URL_VAR)
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout_ms = env
            .var(TIMEOUT_MS_VAR)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        Ok(Self {
            auth_token,
            base_url,
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_applies_defaults() {
        let env = EnvSource::from_pairs([(AUTH_TOKEN_VAR, "sk-test")]);
        let cfg = UpstreamConfig::resolve(&env).expect("config");
        assert_eq!(cfg.auth_token, "sk-test");
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
    }

    #[test]
    fn resolve_fails_closed_without_token() {
        let env = EnvSource::from_pairs([(BASE_URL_VAR, "http://localhost:1")]);
        let err = UpstreamConfig::resolve(&env).unwrap_err();
        assert_eq!(err.to_string(), "ANTHROPIC_AUTH_TOKEN not set");
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let env = EnvSource::from_pairs([(AUTH_TOKEN_VAR, "   ")]);
        assert!(matches!(
            UpstreamConfig::resolve(&env),
            Err(ProxyError::MissingCredential(AUTH_TOKEN_VAR))
        ));
    }

    #[test]
    fn non_numeric_or_zero_timeout_uses_default() {
        for raw in ["soon", "0", "-5"] {
            let env = EnvSource::from_pairs([(AUTH_TOKEN_VAR, "t"), (TIMEOUT_MS_VAR, raw)]);
            let cfg = UpstreamConfig::resolve(&env).expect("config");
            assert_eq!(cfg.timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS), "{raw}");
        }
        let env = EnvSource::from_pairs([(AUTH_TOKEN_VAR, "t"), (TIMEOUT_MS_VAR, " 1500 ")]);
        let cfg = UpstreamConfig::resolve(&env).expect("config");
        assert_eq!(cfg.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn debug_output_redacts_token() {
        let env = EnvSource::from_pairs([(AUTH_TOKEN_VAR, "sk-secret")]);
        let cfg = UpstreamConfig::resolve(&env).expect("config");
        assert!(!format!("{cfg:?}").contains("sk-secret"));
    }

    #[test]
    fn parse_or_falls_back_on_garbage() {
        let env = EnvSource::from_pairs([("PROXY_RELAY_MODE", "sideways")]);
        assert_eq!(env.parse_or("PROXY_RELAY_MODE", RelayMode::Buffer), RelayMode::Buffer);
        let env = EnvSource::from_pairs([("PROXY_RELAY_MODE", " Buffer ")]);
        assert_eq!(env.parse_or("PROXY_RELAY_MODE", RelayMode::Stream), RelayMode::Buffer);
    }
}
