use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, header},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::{
        session::{CreateSessionRequest, SessionCreated, SessionDetails},
        validation::validate_join_code,
    },
    error::AppError,
    services::{session_service, summary::SessionReport},
    state::SharedState,
};

/// Routes handling the session REST surface.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{join_code}", get(session_by_join_code))
        .route("/sessions/{session_id}/summary", get(session_summary))
}

#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = SessionCreated),
        (status = 400, description = "Invalid quiz reference or request"),
        (status = 401, description = "Missing or unresolvable host identity"),
        (status = 409, description = "Host already has an active session")
    )
)]
/// Open a new live session. The caller's bearer token identifies the host;
/// the host connection itself is bound later through the gateway.
pub async fn create_session(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<Json<SessionCreated>, AppError> {
    let host_id = resolve_host(&state, &headers)?;
    let session = session_service::create_session(&state, host_id, None, payload).await?;
    Ok(Json(SessionCreated::from(&session)))
}

#[utoipa::path(
    get,
    path = "/sessions/{join_code}",
    tag = "sessions",
    params(("join_code" = String, Path, description = "Human-shareable join code")),
    responses(
        (status = 200, description = "Session info with participant summaries", body = SessionDetails),
        (status = 404, description = "No session for this code, or it expired"),
        (status = 410, description = "Session exists but can no longer be joined")
    )
)]
/// Look a session up by join code, as clients do before joining.
pub async fn session_by_join_code(
    State(state): State<SharedState>,
    Path(join_code): Path<String>,
) -> Result<Json<SessionDetails>, AppError> {
    let join_code = join_code.to_uppercase();
    validate_join_code(&join_code)
        .map_err(|err| AppError::BadRequest(format!("invalid join code: {err}")))?;

    let session = state
        .store()
        .get_by_join_code(&join_code)
        .await
        .map_err(|err| AppError::ServiceUnavailable(err.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("no session for code `{join_code}`")))?;

    if !session.phase.is_joinable() {
        return Err(AppError::Gone(
            "session can no longer be joined".to_string(),
        ));
    }

    Ok(Json(SessionDetails::from(&session)))
}

#[utoipa::path(
    get,
    path = "/sessions/{session_id}/summary",
    tag = "sessions",
    params(("session_id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Post-completion analytics", body = SessionReport),
        (status = 403, description = "Requester is not the session's host"),
        (status = 404, description = "Session unknown or never reached completion")
    )
)]
/// Post-completion analytics, restricted to the session's host.
pub async fn session_summary(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionReport>, AppError> {
    let host_id = resolve_host(&state, &headers)?;
    let report = session_service::session_summary(&state, session_id, &host_id).await?;
    Ok(Json(report))
}

/// Resolve the caller's host identity from the `Authorization` bearer token.
fn resolve_host(state: &SharedState, headers: &HeaderMap) -> Result<String, AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;

    state
        .identity()
        .resolve(token)
        .ok_or_else(|| AppError::Unauthorized("unresolvable host token".into()))
}
