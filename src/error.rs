use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProxyError {
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Unknown fields present: {0}")]
    UnknownField(String),
    #[error("{0} not set")]
    MissingCredential(&'static str),
    #[error("Request timed out")]
    Timeout,
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Unreachable(String),
    #[error("{0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::InvalidJson(_)
            | ProxyError::InvalidRequest(_)
            | ProxyError::UnknownField(_) => StatusCode::BAD_REQUEST,
            ProxyError::MissingCredential(_)
            | ProxyError::Transport(_)
            | ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Unreachable(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Short label used for the `outcome` metric and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MethodNotAllowed => "method_not_allowed",
            ProxyError::InvalidJson(_) => "invalid_json",
            ProxyError::InvalidRequest(_) => "invalid_request",
            ProxyError::UnknownField(_) => "unknown_field",
            ProxyError::MissingCredential(_) => "config_error",
            ProxyError::Timeout => "timeout",
            ProxyError::Transport(_) => "transport_error",
            ProxyError::Unreachable(_) => "upstream_unreachable",
            ProxyError::Internal(_) => "internal_error",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = ErrorEnvelope {
            error: self.to_string(),
        };
        (self.status(), axum::Json(body)).into_response()
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;
