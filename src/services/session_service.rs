//! Host-facing lifecycle commands: create, resume, start, advance, end, abort.

use std::time::SystemTime;

use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::session::CreateSessionRequest,
    error::ServiceError,
    services::{allocator, events, summary},
    state::{
        SharedState,
        machine::{self, Actor, SessionEvent, SessionPhase},
        session::Session,
    },
};

/// Result of a `next_question` command: either a new live question, or the
/// automatic completion that follows advancing past the final question.
#[derive(Debug)]
pub enum AdvanceOutcome {
    /// The question at the requested index is now live.
    Advanced(Session),
    /// The session completed because the quiz ran out of questions.
    Ended(Session),
}

/// Open a new session for a quiz and write it to the store.
///
/// `connection` is the host's real-time connection when the command arrived
/// over the gateway; REST creations bind the host connection later through
/// `resume_host`.
pub async fn create_session(
    state: &SharedState,
    host_id: String,
    connection: Option<Uuid>,
    request: CreateSessionRequest,
) -> Result<Session, ServiceError> {
    request
        .validate()
        .map_err(|err| ServiceError::ValidationFailed(err.to_string()))?;

    if state
        .store()
        .find_active_by_host(&host_id)
        .await?
        .is_some()
    {
        return Err(ServiceError::HostSessionActive);
    }

    let Some(quiz) = state.quizzes().get_quiz(&request.quiz_id).await else {
        return Err(ServiceError::ValidationFailed(format!(
            "unknown quiz `{}`",
            request.quiz_id
        )));
    };

    let now = SystemTime::now();
    let mut session = Session::new(
        String::new(),
        quiz.quiz_id,
        request.title.unwrap_or(quiz.title),
        host_id,
        quiz.questions.len(),
        state
            .config()
            .clamp_time_limit(request.question_time_limit_seconds),
        now,
    );
    session.host_connection = connection;

    let code = allocator::allocate(
        state.store().as_ref(),
        state.config(),
        session.id,
    )
    .await?;
    session.join_code = code;

    if let Err(err) = state.insert_session(session.clone()).await {
        let _ = state.store().release_join_code(&session.join_code).await;
        return Err(err);
    }

    info!(session_id = %session.id, join_code = %session.join_code, "session created");
    Ok(session)
}

/// Re-establish a connection as the session's host after a reconnect.
///
/// The caller proved its identity through the token; the role binding is
/// re-created explicitly rather than inherited from the old connection.
pub async fn resume_host(
    state: &SharedState,
    session_id: Uuid,
    host_id: &str,
    connection: Uuid,
) -> Result<Session, ServiceError> {
    let session = state.read_session(session_id).await?;
    if session.host_id != host_id {
        return Err(ServiceError::Unauthorized(
            "token does not identify this session's host".into(),
        ));
    }
    if session.phase.is_terminal() {
        return Err(ServiceError::SessionNotActive);
    }

    let cancelled = state.cancel_grace_timer(session_id);
    state.hub().bind_host(session_id, connection);

    let (session, resumed) = state
        .with_session(session_id, |session| {
            if session.phase.is_terminal() {
                return Err(ServiceError::SessionNotActive);
            }
            session.host_connection = Some(connection);
            session.host_disconnected_at = None;
            let resumed = if session.phase == SessionPhase::Paused {
                // Resumes exactly where it left off: same question index, and
                // the question clock is not compensated for the pause.
                session.phase = machine::plan(
                    session.phase,
                    Actor::Host,
                    SessionEvent::HostReconnected,
                )?;
                true
            } else {
                false
            };
            Ok((session.clone(), resumed))
        })
        .await?;

    if resumed {
        info!(session_id = %session_id, "host reconnected within grace window");
        events::broadcast_resumed(state, &session);
    } else if cancelled {
        info!(session_id = %session_id, "host reconnected to lobby within grace window");
    }

    Ok(session)
}

/// Start gameplay: question 0 goes live and per-question flags reset.
pub async fn start_game(state: &SharedState, session_id: Uuid) -> Result<Session, ServiceError> {
    let current = state.read_session(session_id).await?;
    let Some(quiz) = state.quizzes().get_quiz(&current.quiz_id).await else {
        return Err(ServiceError::ValidationFailed(format!(
            "quiz `{}` is no longer available",
            current.quiz_id
        )));
    };

    let Some(first_question) = quiz.questions.first() else {
        return Err(ServiceError::ValidationFailed(
            "quiz has no questions".into(),
        ));
    };
    first_question.validate()?;

    let now = SystemTime::now();
    let question = first_question.clone();
    let session = state
        .with_session(session_id, move |session| {
            session.phase = machine::plan(session.phase, Actor::Host, SessionEvent::StartGame)?;
            session.started_at = Some(now);
            session.question_count = quiz.questions.len();
            session.advance_question(0, question, now);
            Ok(session.clone())
        })
        .await?;

    info!(session_id = %session_id, "game started");
    events::broadcast_game_started(state, &session);
    events::broadcast_question(state, &session);
    Ok(session)
}

/// Advance to the question at `index`, or complete the session when the
/// index points past the final question.
pub async fn next_question(
    state: &SharedState,
    session_id: Uuid,
    index: usize,
) -> Result<AdvanceOutcome, ServiceError> {
    let current = state.read_session(session_id).await?;

    if index >= current.question_count {
        let session = end_session(state, session_id, Actor::Host).await?;
        return Ok(AdvanceOutcome::Ended(session));
    }

    let Some(quiz) = state.quizzes().get_quiz(&current.quiz_id).await else {
        return Err(ServiceError::ValidationFailed(format!(
            "quiz `{}` is no longer available",
            current.quiz_id
        )));
    };
    let Some(question) = quiz.questions.get(index) else {
        return Err(ServiceError::ValidationFailed(format!(
            "quiz has no question at index {index}"
        )));
    };
    question.validate()?;

    let now = SystemTime::now();
    let question = question.clone();
    let session = state
        .with_session(session_id, move |session| {
            session.phase =
                machine::plan(session.phase, Actor::Host, SessionEvent::NextQuestion)?;
            // The index never goes backward, and re-sending the current index
            // is rejected too: rotating the answer set for an index that was
            // already played would allow double scoring.
            if let Some(current_index) = session.current_question_index
                && index <= current_index
            {
                return Err(ServiceError::StaleQuestion { submitted: index });
            }
            session.advance_question(index, question, now);
            Ok(session.clone())
        })
        .await?;

    events::broadcast_question(state, &session);
    events::broadcast_leaderboard(state, &session);
    Ok(AdvanceOutcome::Advanced(session))
}

/// Finish gameplay: freeze scores, record the summary, and notify the group.
pub async fn end_session(
    state: &SharedState,
    session_id: Uuid,
    actor: Actor,
) -> Result<Session, ServiceError> {
    let now = SystemTime::now();
    let (session, report) = state
        .with_session(session_id, move |session| {
            session.phase = machine::plan(session.phase, actor, SessionEvent::EndSession)?;
            session.ended_at = Some(now);
            let report = summary::build_report(session, now);
            session.summary = Some(report.clone());
            Ok((session.clone(), report))
        })
        .await?;

    state.cancel_grace_timer(session_id);
    info!(session_id = %session_id, participants = report.participant_count, "session completed");

    events::broadcast_game_ended(state, &session);
    summary::emit(state.summary_sink().clone(), report);
    state.hub().remove_session(session_id);

    Ok(session)
}

/// Abort path: transition to the absorbing `Terminated` state. Permitted
/// from every phase and idempotent, so racing abort paths settle cleanly.
pub async fn terminate(
    state: &SharedState,
    session_id: Uuid,
    actor: Actor,
    reason: &str,
) -> Result<Session, ServiceError> {
    let now = SystemTime::now();
    let session = state
        .with_session(session_id, move |session| {
            session.phase = machine::plan(session.phase, actor, SessionEvent::Terminate)?;
            if session.ended_at.is_none() {
                session.ended_at = Some(now);
            }
            Ok(session.clone())
        })
        .await?;

    state.cancel_grace_timer(session_id);
    warn!(session_id = %session_id, reason, "session terminated");

    events::broadcast_terminated(state, session_id, reason);
    state.hub().remove_session(session_id);
    state.forget_session_lock(session_id);

    Ok(session)
}

/// Post-completion analytics, restricted to the session's host.
pub async fn session_summary(
    state: &SharedState,
    session_id: Uuid,
    host_id: &str,
) -> Result<summary::SessionReport, ServiceError> {
    let session = state.read_session(session_id).await?;
    if session.host_id != host_id {
        return Err(ServiceError::Unauthorized(
            "only the session's host may read the summary".into(),
        ));
    }
    // A session that never reached Completed has no summary to serve.
    session.summary.ok_or(ServiceError::SessionNotFound)
}
