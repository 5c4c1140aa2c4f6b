//! Answer acceptance and scoring, plus leaderboard reads.

use std::time::SystemTime;

use uuid::Uuid;

use crate::{
    error::ServiceError,
    services::events,
    state::{
        SharedState,
        session::{AnswerRecord, LeaderboardEntry},
    },
};

/// Record one answer for the live question.
///
/// All checks (active phase, current index, one-answer-per-question, option
/// membership) and the score update run inside the session's atomic
/// read-modify-write, so concurrent submissions cannot double-score or
/// overwrite each other. The host gets a progress signal; answer content is
/// never broadcast.
pub async fn submit_answer(
    state: &SharedState,
    session_id: Uuid,
    participant_id: Uuid,
    question_index: usize,
    selected_answer: &str,
) -> Result<AnswerRecord, ServiceError> {
    let now = SystemTime::now();
    let selected = selected_answer.to_string();
    let (session, participant, record) = state
        .with_session(session_id, move |session| {
            let record = session.record_answer(participant_id, question_index, &selected, now)?;
            let participant = session.participants[&participant_id].clone();
            Ok((session.clone(), participant, record))
        })
        .await?;

    events::send_answer_progress(state, &session, &participant);

    Ok(record)
}

/// Current standings in their deterministic total order.
pub async fn leaderboard(
    state: &SharedState,
    session_id: Uuid,
) -> Result<Vec<LeaderboardEntry>, ServiceError> {
    Ok(state.read_session(session_id).await?.leaderboard())
}
