use serde::Serialize;
use utoipa::ToSchema;

use crate::{config::DEFAULT_QUESTION_POINTS, providers::Question};

/// Question view forwarded to the host: includes the correct answer so the
/// host UI can display it alongside live progress.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HostQuestionView {
    /// Index of the question within the quiz.
    pub index: usize,
    /// Stable identifier within the quiz.
    pub question_id: String,
    /// The question text.
    pub question_text: String,
    /// Answer options in display order.
    pub options: Vec<String>,
    /// The correct answer (host only).
    pub correct_answer: String,
    /// Effective time limit, seconds.
    pub time_limit_secs: u32,
    /// Points awarded for a correct answer before the time bonus.
    pub points: i64,
    /// Optional difficulty label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    /// Optional category label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Optional explanation revealed after the question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Question view broadcast to participants: the correct answer (and the
/// explanation that would reveal it) are stripped.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipantQuestionView {
    /// Index of the question within the quiz.
    pub index: usize,
    /// Stable identifier within the quiz.
    pub question_id: String,
    /// The question text.
    pub question_text: String,
    /// Answer options in display order.
    pub options: Vec<String>,
    /// Effective time limit, seconds; clients render the countdown from this.
    pub time_limit_secs: u32,
    /// Points awarded for a correct answer before the time bonus.
    pub points: i64,
}

impl HostQuestionView {
    /// Build the host view, resolving the effective time limit.
    pub fn build(index: usize, question: &Question, default_time_limit_secs: u32) -> Self {
        Self {
            index,
            question_id: question.question_id.clone(),
            question_text: question.question_text.clone(),
            options: question.options.clone(),
            correct_answer: question.correct_answer.clone(),
            time_limit_secs: question.time_limit.unwrap_or(default_time_limit_secs),
            points: question.points.unwrap_or(DEFAULT_QUESTION_POINTS),
            difficulty: question.difficulty.clone(),
            category: question.category.clone(),
            explanation: question.explanation.clone(),
        }
    }
}

impl ParticipantQuestionView {
    /// Build the participant-safe view, resolving the effective time limit.
    pub fn build(index: usize, question: &Question, default_time_limit_secs: u32) -> Self {
        Self {
            index,
            question_id: question.question_id.clone(),
            question_text: question.question_text.clone(),
            options: question.options.clone(),
            time_limit_secs: question.time_limit.unwrap_or(default_time_limit_secs),
            points: question.points.unwrap_or(DEFAULT_QUESTION_POINTS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question() -> Question {
        Question {
            question_id: "q1".into(),
            question_text: "Which band recorded Bohemian Rhapsody?".into(),
            options: vec!["Queen".into(), "ABBA".into()],
            correct_answer: "Queen".into(),
            time_limit: None,
            points: None,
            difficulty: None,
            category: None,
            explanation: Some("It closes A Night at the Opera.".into()),
        }
    }

    #[test]
    fn participant_view_never_carries_the_answer() {
        let view = ParticipantQuestionView::build(0, &question(), 30);
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("correct_answer").is_none());
        assert!(json.get("explanation").is_none());
        assert_eq!(json["time_limit_secs"], 30);
        assert_eq!(json["points"], 100);
    }

    #[test]
    fn host_view_carries_answer_and_override_limits() {
        let mut q = question();
        q.time_limit = Some(20);
        q.points = Some(250);
        let view = HostQuestionView::build(2, &q, 30);
        assert_eq!(view.correct_answer, "Queen");
        assert_eq!(view.time_limit_secs, 20);
        assert_eq!(view.points, 250);
        assert_eq!(view.index, 2);
    }
}
