use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::{
        question::{HostQuestionView, ParticipantQuestionView},
        session::{ParticipantSummary, SessionCreated, SessionDetails},
    },
    error::ErrorCode,
    state::session::{AnswerRecord, LeaderboardEntry},
};

/// Commands accepted from WebSocket clients.
///
/// Host commands are authorized against the connection's established role
/// binding, never against fields of the message itself; `create_session` and
/// `resume_host` are the only commands that establish the host binding.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Open a new session and bind this connection as its host.
    CreateSession {
        /// Reference to the externally supplied quiz.
        quiz_id: String,
        /// Optional session title; defaults to the quiz title.
        title: Option<String>,
        /// Bearer token resolved by the identity provider.
        host_token: String,
        /// Optional session-wide per-question time limit, seconds.
        question_time_limit_seconds: Option<u32>,
    },
    /// Re-establish this connection as the host after a reconnect.
    ResumeHost {
        /// Session to resume.
        session_id: Uuid,
        /// Bearer token; must resolve to the session's host identity.
        host_token: String,
    },
    /// Start gameplay from the lobby.
    StartGame {
        /// Target session.
        session_id: Uuid,
    },
    /// Advance to the question at the given index.
    NextQuestion {
        /// Target session.
        session_id: Uuid,
        /// Explicit target index; must be greater than the current index.
        question_index: usize,
    },
    /// End gameplay and freeze the leaderboard.
    EndSession {
        /// Target session.
        session_id: Uuid,
    },
    /// Remove a participant and bar it from rejoining.
    RemovePlayer {
        /// Target session.
        session_id: Uuid,
        /// Participant to remove.
        participant_id: Uuid,
    },
    /// Lift a ban previously created by `remove_player`.
    UnbanPlayer {
        /// Target session.
        session_id: Uuid,
        /// Display name held at removal time.
        display_name: String,
    },
    /// Join a session by code and bind this connection as the participant.
    JoinSession {
        /// Human-shareable join code.
        join_code: String,
        /// Requested display name; deduplicated by suffixing.
        display_name: String,
    },
    /// Submit one answer for the live question.
    SubmitAnswer {
        /// Target session.
        session_id: Uuid,
        /// Index the answer refers to; rejected when no longer current.
        question_index: usize,
        /// The selected option.
        selected_answer: String,
    },
    /// Leave the session voluntarily (no blacklist).
    LeaveSession {
        /// Target session.
        session_id: Uuid,
    },
    /// Anything unrecognized; answered with `validation_failed`.
    #[serde(other)]
    Unknown,
}

impl ClientCommand {
    /// Stable command name echoed back in replies.
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::CreateSession { .. } => "create_session",
            ClientCommand::ResumeHost { .. } => "resume_host",
            ClientCommand::StartGame { .. } => "start_game",
            ClientCommand::NextQuestion { .. } => "next_question",
            ClientCommand::EndSession { .. } => "end_session",
            ClientCommand::RemovePlayer { .. } => "remove_player",
            ClientCommand::UnbanPlayer { .. } => "unban_player",
            ClientCommand::JoinSession { .. } => "join_session",
            ClientCommand::SubmitAnswer { .. } => "submit_answer",
            ClientCommand::LeaveSession { .. } => "leave_session",
            ClientCommand::Unknown => "unknown",
        }
    }
}

/// Per-command response envelope: a success flag plus either a typed result
/// payload or an error code, never a loose bag of fields.
#[derive(Debug, Serialize, ToSchema)]
pub struct CommandReply {
    /// Command this reply answers.
    pub command: String,
    /// Whether the command was applied.
    pub success: bool,
    /// Error code when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    /// Result payload when `success` is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ReplyData>,
}

impl CommandReply {
    /// Successful reply with a payload.
    pub fn ok(command: &str, data: ReplyData) -> Self {
        Self {
            command: command.to_string(),
            success: true,
            error: None,
            data: Some(data),
        }
    }

    /// Failed reply carrying the error code.
    pub fn fail(command: &str, error: ErrorCode) -> Self {
        Self {
            command: command.to_string(),
            success: false,
            error: Some(error),
            data: None,
        }
    }
}

/// Typed result payloads carried by successful replies.
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyData {
    /// Result of `create_session`.
    SessionCreated {
        /// Created session summary.
        session: SessionCreated,
    },
    /// Result of `resume_host`: the full current picture for the host UI.
    HostResumed {
        /// Session details at resume time.
        session: SessionDetails,
        /// The live question, when gameplay is in flight.
        #[serde(skip_serializing_if = "Option::is_none")]
        current_question: Option<HostQuestionView>,
    },
    /// Result of `join_session`.
    Joined {
        /// Session the participant joined.
        session: SessionDetails,
        /// The participant record, including the deduplicated name.
        participant: ParticipantSummary,
        /// The live question a late joiner may still answer.
        #[serde(skip_serializing_if = "Option::is_none")]
        current_question: Option<ParticipantQuestionView>,
    },
    /// Result of `start_game` and `next_question` for the host.
    QuestionAdvanced {
        /// Host view of the now-live question.
        question: HostQuestionView,
    },
    /// Result of `end_session`.
    Ended {
        /// Frozen final leaderboard.
        leaderboard: Vec<LeaderboardEntry>,
    },
    /// Result of `submit_answer`.
    AnswerRecorded {
        /// The recorded answer with its scoring breakdown.
        answer: AnswerSummary,
    },
    /// Result of `remove_player`.
    Removed {
        /// The evicted participant.
        participant_id: Uuid,
    },
    /// Result of `unban_player`.
    Unbanned {
        /// Whether a matching ban existed.
        lifted: bool,
    },
    /// Plain acknowledgement (leave_session).
    Ack,
}

/// Scoring breakdown returned to the submitting participant.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnswerSummary {
    /// Unique identifier of the answer record.
    pub answer_id: Uuid,
    /// Question index the answer refers to.
    pub question_index: usize,
    /// The matched option.
    pub selected_answer: String,
    /// Whether the selection was correct.
    pub is_correct: bool,
    /// Question points before the time bonus.
    pub base_score: i64,
    /// Time bonus earned; zero when incorrect or late.
    pub time_bonus: i64,
    /// Total points credited.
    pub total_score: i64,
    /// Milliseconds from question start to submission.
    pub response_ms: u64,
}

impl From<&AnswerRecord> for AnswerSummary {
    fn from(record: &AnswerRecord) -> Self {
        Self {
            answer_id: record.id,
            question_index: record.question_index,
            selected_answer: record.selected_answer.clone(),
            is_correct: record.is_correct,
            base_score: record.base_score,
            time_bonus: record.time_bonus,
            total_score: record.total_score,
            response_ms: record.response_time.as_millis() as u64,
        }
    }
}

/// Server-initiated broadcast events. Each variant has a fixed schema so
/// serialization is stable and test-verifiable.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Gameplay started; the first question follows immediately.
    GameStarted {
        /// Session the event belongs to.
        session_id: Uuid,
        /// Total number of questions.
        question_count: usize,
    },
    /// Participant-safe view of the now-live question.
    NewQuestion {
        /// Session the event belongs to.
        session_id: Uuid,
        /// The question with the correct answer stripped.
        question: ParticipantQuestionView,
    },
    /// Host view of the now-live question (host-private channel).
    QuestionStarted {
        /// Session the event belongs to.
        session_id: Uuid,
        /// The question including the correct answer.
        question: HostQuestionView,
        /// Participants present when the question went live.
        participant_count: usize,
    },
    /// Gameplay finished; scores are frozen.
    GameEnded {
        /// Session the event belongs to.
        session_id: Uuid,
        /// Final leaderboard snapshot.
        leaderboard: Vec<LeaderboardEntry>,
    },
    /// A participant joined the session.
    ParticipantJoined {
        /// Session the event belongs to.
        session_id: Uuid,
        /// The new participant.
        participant: ParticipantSummary,
        /// Participants after the join.
        participant_count: usize,
    },
    /// A participant left, was removed, or was evicted by the sweep.
    ParticipantLeft {
        /// Session the event belongs to.
        session_id: Uuid,
        /// The departed participant.
        participant_id: Uuid,
        /// Display name at departure time.
        display_name: String,
        /// Participants after the departure.
        participant_count: usize,
    },
    /// Live answering progress (host-private channel; no answer content).
    AnswerSubmitted {
        /// Session the event belongs to.
        session_id: Uuid,
        /// Who answered.
        participant_id: Uuid,
        /// Display name of the answering participant.
        display_name: String,
        /// Participants that have answered the live question.
        answered_count: usize,
        /// Participants present.
        participant_count: usize,
    },
    /// Current standings, broadcast after scoring changes.
    LeaderboardUpdate {
        /// Session the event belongs to.
        session_id: Uuid,
        /// Deterministically ordered standings.
        leaderboard: Vec<LeaderboardEntry>,
    },
    /// Targeted notice that the recipient was removed by the host.
    RemovedFromSession {
        /// Session the event belongs to.
        session_id: Uuid,
        /// Human-readable reason.
        reason: String,
    },
    /// The host disconnected mid-game; gameplay is frozen.
    SessionPaused {
        /// Session the event belongs to.
        session_id: Uuid,
        /// Seconds the host has to reconnect before termination.
        grace_seconds: u64,
    },
    /// The host reconnected within the grace window.
    SessionResumed {
        /// Session the event belongs to.
        session_id: Uuid,
        /// Index of the still-current question.
        current_question_index: Option<usize>,
    },
    /// The session reached its absorbing failure state.
    SessionTerminated {
        /// Session the event belongs to.
        session_id: Uuid,
        /// Human-readable reason.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_deserialize_from_tagged_json() {
        let command: ClientCommand = serde_json::from_str(
            r#"{"type": "join_session", "join_code": "QXK7PD", "display_name": "Alex"}"#,
        )
        .unwrap();
        assert!(matches!(command, ClientCommand::JoinSession { .. }));
        assert_eq!(command.name(), "join_session");
    }

    #[test]
    fn unknown_commands_fall_through_to_unknown() {
        let command: ClientCommand =
            serde_json::from_str(r#"{"type": "reboot_universe"}"#).unwrap();
        assert!(matches!(command, ClientCommand::Unknown));
    }

    #[test]
    fn failed_replies_carry_the_error_code() {
        let reply = CommandReply::fail("submit_answer", ErrorCode::AlreadyAnswered);
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "already_answered");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn events_serialize_with_stable_tags() {
        let event = ServerEvent::SessionPaused {
            session_id: Uuid::nil(),
            grace_seconds: 30,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "session_paused");
        assert_eq!(json["grace_seconds"], 30);
    }
}
