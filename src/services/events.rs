//! Broadcast fan-out helpers layered on the session hub.
//!
//! Broadcasts are best-effort notifications on top of the per-command reply
//! channel; they never carry the primary success/failure signal and a slow
//! subscriber never stalls the command that triggered them.

use uuid::Uuid;

use crate::{
    dto::{
        question::{HostQuestionView, ParticipantQuestionView},
        session::ParticipantSummary,
        ws::ServerEvent,
    },
    state::{
        SharedState,
        session::{Participant, Session},
    },
};

/// Announce the start of gameplay to the whole session group.
pub fn broadcast_game_started(state: &SharedState, session: &Session) {
    state.hub().broadcast(
        session.id,
        &ServerEvent::GameStarted {
            session_id: session.id,
            question_count: session.question_count,
        },
    );
}

/// Push the live question: the stripped view to the session group, the full
/// view (correct answer included) to the host-private channel.
pub fn broadcast_question(state: &SharedState, session: &Session) {
    let Some(index) = session.current_question_index else {
        return;
    };
    let Some(question) = session.current_question.as_ref() else {
        return;
    };

    state.hub().broadcast(
        session.id,
        &ServerEvent::NewQuestion {
            session_id: session.id,
            question: ParticipantQuestionView::build(
                index,
                question,
                session.question_time_limit_secs,
            ),
        },
    );
    state.hub().send_to_host(
        session.id,
        &ServerEvent::QuestionStarted {
            session_id: session.id,
            question: HostQuestionView::build(index, question, session.question_time_limit_secs),
            participant_count: session.participants.len(),
        },
    );
}

/// Announce the end of gameplay with the frozen leaderboard.
pub fn broadcast_game_ended(state: &SharedState, session: &Session) {
    state.hub().broadcast(
        session.id,
        &ServerEvent::GameEnded {
            session_id: session.id,
            leaderboard: session.leaderboard(),
        },
    );
}

/// Announce a new participant to the session group.
pub fn broadcast_participant_joined(
    state: &SharedState,
    session: &Session,
    participant: &Participant,
) {
    state.hub().broadcast(
        session.id,
        &ServerEvent::ParticipantJoined {
            session_id: session.id,
            participant: ParticipantSummary::from(participant),
            participant_count: session.participants.len(),
        },
    );
}

/// Announce a departure (voluntary leave, removal, or sweep eviction).
pub fn broadcast_participant_left(
    state: &SharedState,
    session: &Session,
    participant: &Participant,
) {
    state.hub().broadcast(
        session.id,
        &ServerEvent::ParticipantLeft {
            session_id: session.id,
            participant_id: participant.id,
            display_name: participant.display_name.clone(),
            participant_count: session.participants.len(),
        },
    );
}

/// Tell the host who has answered so far, without exposing answer content.
pub fn send_answer_progress(state: &SharedState, session: &Session, participant: &Participant) {
    state.hub().send_to_host(
        session.id,
        &ServerEvent::AnswerSubmitted {
            session_id: session.id,
            participant_id: participant.id,
            display_name: participant.display_name.clone(),
            answered_count: session.answered_count(),
            participant_count: session.participants.len(),
        },
    );
}

/// Push the current standings to the session group.
pub fn broadcast_leaderboard(state: &SharedState, session: &Session) {
    state.hub().broadcast(
        session.id,
        &ServerEvent::LeaderboardUpdate {
            session_id: session.id,
            leaderboard: session.leaderboard(),
        },
    );
}

/// Tell one removed participant it is out, before its socket is closed.
pub fn send_removed(state: &SharedState, session_id: Uuid, connection_id: Uuid, reason: &str) {
    state.hub().send_to(
        connection_id,
        &ServerEvent::RemovedFromSession {
            session_id,
            reason: reason.to_string(),
        },
    );
}

/// Announce the grace-period pause after a host disconnect.
pub fn broadcast_paused(state: &SharedState, session: &Session, grace_seconds: u64) {
    state.hub().broadcast(
        session.id,
        &ServerEvent::SessionPaused {
            session_id: session.id,
            grace_seconds,
        },
    );
}

/// Announce that the host came back and gameplay resumed where it left off.
pub fn broadcast_resumed(state: &SharedState, session: &Session) {
    state.hub().broadcast(
        session.id,
        &ServerEvent::SessionResumed {
            session_id: session.id,
            current_question_index: session.current_question_index,
        },
    );
}

/// Announce the terminal transition; observed in place of a reply since the
/// supervisor has no caller to report to.
pub fn broadcast_terminated(state: &SharedState, session_id: Uuid, reason: &str) {
    state.hub().broadcast(
        session_id,
        &ServerEvent::SessionTerminated {
            session_id,
            reason: reason.to_string(),
        },
    );
}
