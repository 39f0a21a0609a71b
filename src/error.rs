//! Proxy Error Taxonomy
//!
//! Every fallible library call returns [`Result`]. Handlers turn a
//! [`ProxyError`] into an HTTP response whose status and `code` field let the
//! control plane tell routing failures apart from engine failures.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProxyError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProxyError {
    /// Dial or transport failure talking to an engine. Retryable.
    #[error("connection to {address} failed: {message}")]
    Connection { address: String, message: String },
    /// A forward failed again after the single internal retry.
    #[error("engine {address} unavailable: {message}")]
    UpstreamUnavailable { address: String, message: String },
    #[error("operation {0} is already in progress")]
    DuplicateOperation(String),
    #[error("operation {0} not found")]
    UnknownOperation(String),
    /// Application-level failure reported by the engine itself, kept verbatim.
    #[error("{0}")]
    Engine(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ProxyError {
    /// Transport-level failures are the only ones worth a redial.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection_error",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::DuplicateOperation(_) => "duplicate_operation",
            Self::UnknownOperation(_) => "unknown_operation",
            Self::Engine(_) => "engine_error",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Unsupported(_) => "unsupported",
            Self::Serialization(_) => "serialization_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Connection { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            Self::DuplicateOperation(_) => StatusCode::CONFLICT,
            Self::UnknownOperation(_) => StatusCode::NOT_FOUND,
            Self::Engine(_) | Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
        }
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Body of every non-2xx proxy response.
#[derive(Debug, Serialize, serde::Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
