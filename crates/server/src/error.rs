//! API error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Error type for API handlers, mapped onto HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Requested entity does not exist (404).
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Malformed input (400).
    #[error("{0}")]
    Validation(String),

    /// Expired or already-used join token (401). The token is not consumed.
    #[error("invalid or expired join token")]
    TokenInvalid,

    /// Authenticated peer certificate required, or route restricted to the
    /// coordinator (403).
    #[error("{0}")]
    Forbidden(&'static str),

    /// Optional subsystem not wired on this node (503).
    #[error("{0} not available")]
    Unavailable(&'static str),

    /// Store or internal failure (500).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::TokenInvalid => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<pingmesh_store::Error> for ApiError {
    fn from(e: pingmesh_store::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<pingmesh_cluster::Error> for ApiError {
    fn from(e: pingmesh_cluster::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<pingmesh_model::Error> for ApiError {
    fn from(e: pingmesh_model::Error) -> Self {
        match e {
            pingmesh_model::Error::Validation(msg) => Self::Validation(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<pingmesh_ca::Error> for ApiError {
    fn from(e: pingmesh_ca::Error) -> Self {
        Self::Internal(e.to_string())
    }
}
