//! Post-completion analytics: report computation and fire-and-forget emission.

use std::{sync::Arc, time::SystemTime};

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    providers::SummarySink,
    state::session::{LeaderboardEntry, Session},
};

/// Rows kept in the report's top-of-leaderboard extract.
const TOP_N: usize = 10;

/// Durable summary of one completed session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionReport {
    /// Session the report describes.
    pub session_id: Uuid,
    /// Quiz the session ran.
    pub quiz_id: String,
    /// Session title.
    pub title: String,
    /// Participants present at completion.
    pub participant_count: usize,
    /// Mean cumulative score across participants.
    pub average_score: f64,
    /// Correct answers over total answers, 0 to 1.
    pub average_accuracy: f64,
    /// Mean answer latency, milliseconds.
    pub average_response_ms: f64,
    /// Top of the final leaderboard.
    pub top: Vec<LeaderboardEntry>,
    /// Per-question answer statistics.
    pub per_question: Vec<QuestionAccuracy>,
    /// Completion timestamp, RFC 3339.
    pub completed_at: String,
}

/// Accuracy of one question across every submitted answer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuestionAccuracy {
    /// Index of the question within the quiz.
    pub question_index: usize,
    /// Answers submitted for this question.
    pub answers: usize,
    /// Correct answers among them.
    pub correct: usize,
}

/// Compute the completion report from the session's participants and its
/// full answer log.
pub fn build_report(session: &Session, completed_at: SystemTime) -> SessionReport {
    let participant_count = session.participants.len();
    let average_score = if participant_count == 0 {
        0.0
    } else {
        session
            .participants
            .values()
            .map(|p| p.score as f64)
            .sum::<f64>()
            / participant_count as f64
    };

    let total_answers = session.answer_log.len();
    let correct_answers = session
        .answer_log
        .iter()
        .filter(|record| record.is_correct)
        .count();
    let average_accuracy = if total_answers == 0 {
        0.0
    } else {
        correct_answers as f64 / total_answers as f64
    };
    let average_response_ms = if total_answers == 0 {
        0.0
    } else {
        session
            .answer_log
            .iter()
            .map(|record| record.response_time.as_millis() as f64)
            .sum::<f64>()
            / total_answers as f64
    };

    let mut per_question: Vec<QuestionAccuracy> = Vec::new();
    for record in &session.answer_log {
        let slot = match per_question
            .iter_mut()
            .find(|entry| entry.question_index == record.question_index)
        {
            Some(slot) => slot,
            None => {
                per_question.push(QuestionAccuracy {
                    question_index: record.question_index,
                    answers: 0,
                    correct: 0,
                });
                per_question.last_mut().expect("just pushed")
            }
        };
        slot.answers += 1;
        if record.is_correct {
            slot.correct += 1;
        }
    }
    per_question.sort_by_key(|entry| entry.question_index);

    let mut top = session.leaderboard();
    top.truncate(TOP_N);

    SessionReport {
        session_id: session.id,
        quiz_id: session.quiz_id.clone(),
        title: session.title.clone(),
        participant_count,
        average_score,
        average_accuracy,
        average_response_ms,
        top,
        per_question,
        completed_at: OffsetDateTime::from(completed_at)
            .format(&Rfc3339)
            .unwrap_or_else(|_| "invalid-timestamp".into()),
    }
}

/// Hand the report to the summary sink without awaiting it: sink failures
/// must never affect the live session's correctness.
pub fn emit(sink: Arc<dyn SummarySink>, report: SessionReport) {
    tokio::spawn(async move {
        sink.persist(report).await;
    });
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::{providers::Question, state::machine::SessionPhase};

    fn question() -> Question {
        Question {
            question_id: "q0".into(),
            question_text: "Which band recorded Bohemian Rhapsody?".into(),
            options: vec!["Queen".into(), "ABBA".into()],
            correct_answer: "Queen".into(),
            time_limit: Some(30),
            points: Some(100),
            difficulty: None,
            category: None,
            explanation: None,
        }
    }

    #[test]
    fn report_aggregates_scores_and_accuracy() {
        let start = SystemTime::UNIX_EPOCH;
        let mut session = Session::new(
            "ABC234".into(),
            "quiz-1".into(),
            "title".into(),
            "host-1".into(),
            2,
            30,
            start,
        );
        session.phase = SessionPhase::Active;
        session.advance_question(0, question(), start);

        let alex = session.join("Alex", start).unwrap();
        let bob = session.join("Bob", start).unwrap();
        session
            .record_answer(alex.id, 0, "Queen", start + Duration::from_secs(5))
            .unwrap();
        session
            .record_answer(bob.id, 0, "ABBA", start + Duration::from_secs(10))
            .unwrap();

        let report = build_report(&session, start + Duration::from_secs(60));

        assert_eq!(report.participant_count, 2);
        assert_eq!(report.average_score, 71.0); // (142 + 0) / 2
        assert_eq!(report.average_accuracy, 0.5);
        assert_eq!(report.average_response_ms, 7_500.0);
        assert_eq!(report.per_question.len(), 1);
        assert_eq!(report.per_question[0].answers, 2);
        assert_eq!(report.per_question[0].correct, 1);
        assert_eq!(report.top[0].display_name, "Alex");
    }

    #[test]
    fn empty_sessions_produce_zeroed_report() {
        let session = Session::new(
            "ABC234".into(),
            "quiz-1".into(),
            "title".into(),
            "host-1".into(),
            0,
            30,
            SystemTime::UNIX_EPOCH,
        );
        let report = build_report(&session, SystemTime::UNIX_EPOCH);
        assert_eq!(report.participant_count, 0);
        assert_eq!(report.average_score, 0.0);
        assert_eq!(report.average_accuracy, 0.0);
        assert!(report.per_question.is_empty());
    }
}
