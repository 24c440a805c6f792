//! The HTTP error taxonomy, per spec §7.
//!
//! Every handler returns `Result<_, ApiError>`; [`ApiError::into_response`]
//! is the single place that maps a failure kind to a status code and the
//! `{"error": kind, "details": ...}` body shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use layer0::error::OperatorError;
use neuron_session::SessionError;
use neuron_swarm::SwarmError;
use serde::Serialize;

/// A failure surfaced to an HTTP caller.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request body or parameters.
    #[error("invalid request: {0}")]
    InvalidInput(String),
    /// Missing or incorrect bearer token / HMAC signature.
    #[error("unauthorised: {0}")]
    Unauthorised(String),
    /// No session, swarm, or tool exists with the given id/name.
    #[error("not found: {0}")]
    NotFound(String),
    /// The Noise Filter rejected the input.
    #[error("filtered: {0}")]
    SignalFiltered(String),
    /// A budget ceiling was exceeded.
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),
    /// A tool call timed out or errored.
    #[error("tool error: {0}")]
    ToolError(String),
    /// The request was cancelled (e.g. a swarm was cancelled mid-flight).
    #[error("cancelled: {0}")]
    Cancelled(String),
    /// A session or required component could not be reached/spawned.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// Anything else — a provider hard-failure, an internal invariant
    /// violation, or an unanticipated error.
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    details: String,
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "invalid_input",
            ApiError::Unauthorised(_) => "unauthorised",
            ApiError::NotFound(_) => "not_found",
            ApiError::SignalFiltered(_) => "signal_filtered",
            ApiError::BudgetExceeded(_) => "budget_exceeded",
            ApiError::ToolError(_) => "tool_error",
            ApiError::Cancelled(_) => "cancelled",
            ApiError::Unavailable(_) => "unavailable",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorised(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::SignalFiltered(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BudgetExceeded(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ToolError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Cancelled(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }
        let body = ErrorBody {
            error: self.kind(),
            details: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<OperatorError> for ApiError {
    fn from(err: OperatorError) -> Self {
        match err {
            OperatorError::Model(msg) => ApiError::Internal(msg),
            OperatorError::Tool { tool, message } => ApiError::ToolError(format!("{tool}: {message}")),
            OperatorError::ContextAssembly(msg) => ApiError::Internal(msg),
            OperatorError::Retryable(msg) => ApiError::Internal(msg),
            OperatorError::NonRetryable(msg) => ApiError::InvalidInput(msg),
            OperatorError::Other(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound => ApiError::NotFound("session not found".to_string()),
            SessionError::Unavailable => ApiError::Unavailable("session registry unavailable".to_string()),
        }
    }
}

impl From<SwarmError> for ApiError {
    fn from(err: SwarmError) -> Self {
        match err {
            SwarmError::InvalidPattern => ApiError::InvalidInput("invalid swarm pattern".to_string()),
            SwarmError::TooManySwarms => ApiError::BudgetExceeded("too many concurrent swarms".to_string()),
            SwarmError::NotFound => ApiError::NotFound("swarm not found".to_string()),
            SwarmError::NotRunning => ApiError::InvalidInput("swarm is not running".to_string()),
        }
    }
}
