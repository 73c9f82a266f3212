//! Error taxonomy for the agent core.
//!
//! Storage and CLI code use `anyhow::Result`; everything that crosses the
//! HTTP boundary is lifted into [`AgentError`], which knows its status code
//! and a stable `kind` string for clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Missing or malformed input, unknown action or model.
    #[error("{0}")]
    Validation(String),

    /// Role insufficient, token invalid, or a blocked destructive statement.
    #[error("{0}")]
    AccessDenied(String),

    /// Session, database or connection does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Required process configuration (encryption key, API key) is absent.
    #[error("{0}")]
    Configuration(String),

    /// Managed database not ready, model API error, interrupted stream.
    #[error("{0}")]
    UpstreamUnavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AgentResult<T> = Result<T, AgentError>;

impl AgentError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AgentError::Validation(_) => StatusCode::BAD_REQUEST,
            AgentError::AccessDenied(_) => StatusCode::FORBIDDEN,
            AgentError::NotFound(_) => StatusCode::NOT_FOUND,
            AgentError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AgentError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            AgentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Validation(_) => "validation_error",
            AgentError::AccessDenied(_) => "access_denied",
            AgentError::NotFound(_) => "not_found",
            AgentError::Configuration(_) => "configuration_error",
            AgentError::UpstreamUnavailable(_) => "upstream_unavailable",
            AgentError::Internal(_) => "internal_error",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AgentError::Validation(msg.into())
    }

    pub fn access_denied(msg: impl Into<String>) -> Self {
        AgentError::AccessDenied(msg.into())
    }
}

impl From<sqlx::Error> for AgentError {
    fn from(e: sqlx::Error) -> Self {
        AgentError::Internal(e.into())
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        }
        (
            status,
            Json(serde_json::json!({"error": self.to_string(), "kind": self.kind()})),
        )
            .into_response()
    }
}
