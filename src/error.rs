use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::{dao::storage::StorageError, state::machine::TransitionError};

/// Errors that can occur in service layer operations.
///
/// Every command handler recovers these at its boundary and returns them as
/// typed results; none may unwind into the gateway's connection management.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No session exists for the given id or join code (or it expired).
    #[error("session not found")]
    SessionNotFound,
    /// The session exists but its state forbids joining.
    #[error("session cannot be joined in its current state")]
    SessionNotJoinable,
    /// The command requires an active session.
    #[error("session is not active")]
    SessionNotActive,
    /// The answered question is no longer the current one.
    #[error("question {submitted} is not the current question")]
    StaleQuestion {
        /// Index the caller answered.
        submitted: usize,
    },
    /// The participant already answered the current question.
    #[error("participant already answered this question")]
    AlreadyAnswered,
    /// The selected answer is not among the current question's options.
    #[error("`{0}` is not an option of the current question")]
    InvalidOption(String),
    /// Wrong role, or a stale connection that has not re-established its role.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The identity is barred from rejoining this session.
    #[error("removed from this session")]
    Blacklisted,
    /// Display-name suffixing exhausted its attempt budget.
    #[error("could not derive a unique display name")]
    DisplayNameConflictUnresolved,
    /// The host already has a non-terminal session open.
    #[error("host already has an active session")]
    HostSessionActive,
    /// Join-code generation exhausted its attempt budget.
    #[error("join code allocation exhausted")]
    AllocationExhausted,
    /// Malformed input (question payload, display name, request body).
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    /// Storage backend is unavailable; the command fails closed.
    #[error("storage unavailable")]
    Unavailable(#[from] StorageError),
}

/// Stable error code carried in wire replies (`{success: false, error: <code>}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// See [`ServiceError::SessionNotFound`].
    SessionNotFound,
    /// See [`ServiceError::SessionNotJoinable`].
    SessionNotJoinable,
    /// See [`ServiceError::SessionNotActive`].
    SessionNotActive,
    /// See [`ServiceError::StaleQuestion`].
    StaleQuestion,
    /// See [`ServiceError::AlreadyAnswered`].
    AlreadyAnswered,
    /// See [`ServiceError::InvalidOption`].
    InvalidOption,
    /// See [`ServiceError::Unauthorized`].
    Unauthorized,
    /// See [`ServiceError::Blacklisted`].
    Blacklisted,
    /// See [`ServiceError::DisplayNameConflictUnresolved`].
    DisplayNameConflictUnresolved,
    /// See [`ServiceError::HostSessionActive`].
    HostSessionActive,
    /// See [`ServiceError::AllocationExhausted`].
    AllocationExhausted,
    /// See [`ServiceError::ValidationFailed`].
    ValidationFailed,
    /// Transient infrastructure fault; callers decide retry policy.
    Internal,
}

impl ServiceError {
    /// The wire code reported to clients for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::SessionNotFound => ErrorCode::SessionNotFound,
            ServiceError::SessionNotJoinable => ErrorCode::SessionNotJoinable,
            ServiceError::SessionNotActive => ErrorCode::SessionNotActive,
            ServiceError::StaleQuestion { .. } => ErrorCode::StaleQuestion,
            ServiceError::AlreadyAnswered => ErrorCode::AlreadyAnswered,
            ServiceError::InvalidOption(_) => ErrorCode::InvalidOption,
            ServiceError::Unauthorized(_) => ErrorCode::Unauthorized,
            ServiceError::Blacklisted => ErrorCode::Blacklisted,
            ServiceError::DisplayNameConflictUnresolved => {
                ErrorCode::DisplayNameConflictUnresolved
            }
            ServiceError::HostSessionActive => ErrorCode::HostSessionActive,
            ServiceError::AllocationExhausted => ErrorCode::AllocationExhausted,
            ServiceError::ValidationFailed(_) => ErrorCode::ValidationFailed,
            ServiceError::Unavailable(_) => ErrorCode::Internal,
        }
    }
}

impl From<TransitionError> for ServiceError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::Unauthorized { .. } => ServiceError::Unauthorized(err.to_string()),
            // Every invalid-state transition surfaces as "not active": commands
            // against completed/terminated/paused sessions land here.
            TransitionError::Invalid { .. } => ServiceError::SessionNotActive,
        }
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Missing or unresolvable caller identity.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Caller identity is known but not entitled to the resource.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Resource exists but is no longer available for this operation.
    #[error("gone: {0}")]
    Gone(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::SessionNotFound => AppError::NotFound(message),
            ServiceError::SessionNotJoinable => AppError::Gone(message),
            ServiceError::SessionNotActive
            | ServiceError::StaleQuestion { .. }
            | ServiceError::AlreadyAnswered
            | ServiceError::HostSessionActive => AppError::Conflict(message),
            ServiceError::InvalidOption(_)
            | ServiceError::ValidationFailed(_)
            | ServiceError::DisplayNameConflictUnresolved => AppError::BadRequest(message),
            ServiceError::Unauthorized(_) | ServiceError::Blacklisted => {
                AppError::Forbidden(message)
            }
            ServiceError::AllocationExhausted => AppError::Internal(message),
            ServiceError::Unavailable(_) => AppError::ServiceUnavailable(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Gone(_) => StatusCode::GONE,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
