use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::format_system_time,
    state::{
        machine::SessionPhase,
        session::{Participant, Session},
    },
};

/// Payload used to open a new live session for a quiz.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateSessionRequest {
    /// Reference to the externally supplied quiz.
    #[validate(length(min = 1, max = 128))]
    pub quiz_id: String,
    /// Optional session title; defaults to the quiz title.
    #[validate(length(min = 1, max = 80))]
    pub title: Option<String>,
    /// Optional session-wide time limit per question, seconds (5-300).
    #[validate(range(min = 5, max = 300))]
    pub question_time_limit_seconds: Option<u32>,
}

/// Summary returned once a session has been created.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionCreated {
    /// Opaque session identifier.
    pub session_id: Uuid,
    /// Human-shareable join code.
    pub join_code: String,
    /// Session title.
    pub title: String,
    /// Current lifecycle phase (always `lobby` at creation).
    pub state: SessionPhase,
    /// Creation timestamp, RFC 3339.
    pub created_at: String,
}

/// Public projection of a participant exposed to REST and broadcast clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipantSummary {
    /// Participant identifier within the session.
    pub participant_id: Uuid,
    /// Unique display name, possibly suffixed.
    pub display_name: String,
    /// Cumulative score.
    pub score: i64,
    /// Correct answer count.
    pub correct_answers: u32,
    /// Submitted answer count.
    pub total_answers: u32,
    /// Whether a live connection is currently bound.
    pub is_connected: bool,
    /// Whether the participant answered the live question.
    pub has_answered_current_question: bool,
    /// Join timestamp, RFC 3339.
    pub joined_at: String,
}

/// Full session info returned by the join-code lookup.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionDetails {
    /// Opaque session identifier.
    pub session_id: Uuid,
    /// Human-shareable join code.
    pub join_code: String,
    /// Session title.
    pub title: String,
    /// Reference to the externally supplied quiz.
    pub quiz_id: String,
    /// Current lifecycle phase.
    pub state: SessionPhase,
    /// Index of the live question, when gameplay has started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_question_index: Option<usize>,
    /// Number of questions in the quiz.
    pub question_count: usize,
    /// Session-wide per-question time limit, seconds.
    pub question_time_limit_seconds: u32,
    /// Connected-or-recently-disconnected players.
    pub participants: Vec<ParticipantSummary>,
    /// Creation timestamp, RFC 3339.
    pub created_at: String,
    /// Gameplay start timestamp, RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

impl From<&Participant> for ParticipantSummary {
    fn from(participant: &Participant) -> Self {
        Self {
            participant_id: participant.id,
            display_name: participant.display_name.clone(),
            score: participant.score,
            correct_answers: participant.correct_answers,
            total_answers: participant.total_answers,
            is_connected: participant.is_connected,
            has_answered_current_question: participant.has_answered_current_question,
            joined_at: format_system_time(participant.joined_at),
        }
    }
}

impl From<&Session> for SessionCreated {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id,
            join_code: session.join_code.clone(),
            title: session.title.clone(),
            state: session.phase,
            created_at: format_system_time(session.created_at),
        }
    }
}

impl From<&Session> for SessionDetails {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id,
            join_code: session.join_code.clone(),
            title: session.title.clone(),
            quiz_id: session.quiz_id.clone(),
            state: session.phase,
            current_question_index: session.current_question_index,
            question_count: session.question_count,
            question_time_limit_seconds: session.question_time_limit_secs,
            participants: session.participants.values().map(Into::into).collect(),
            created_at: format_system_time(session.created_at),
            started_at: session.started_at.map(format_system_time),
        }
    }
}
