//! Collaborator interfaces consumed by the session core.
//!
//! Quiz content, host identity, and summary persistence are external
//! concerns; the core only depends on these traits. Shipped implementations
//! live in [`catalog`] (JSON-file quiz provider) and here (opaque identity,
//! logging summary sink).

pub mod catalog;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::{
    config::{MAX_QUESTION_TIME_LIMIT_SECS, MIN_QUESTION_TIME_LIMIT_SECS},
    error::ServiceError,
    services::summary::SessionReport,
};

/// Maximum accepted question text length.
const MAX_QUESTION_TEXT_LEN: usize = 500;

/// One question of an externally supplied quiz.
///
/// The payload is validated by the core before any broadcast; participants
/// never see `correct_answer`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Question {
    /// Stable identifier within the quiz.
    pub question_id: String,
    /// The question text shown to everyone.
    pub question_text: String,
    /// 2 to 6 answer options.
    pub options: Vec<String>,
    /// Must case-insensitively match one of `options`.
    pub correct_answer: String,
    /// Optional per-question time limit override, seconds.
    #[serde(default)]
    pub time_limit: Option<u32>,
    /// Optional per-question points override.
    #[serde(default)]
    pub points: Option<i64>,
    /// Optional difficulty label.
    #[serde(default)]
    pub difficulty: Option<String>,
    /// Optional category label.
    #[serde(default)]
    pub category: Option<String>,
    /// Optional explanation revealed after the question.
    #[serde(default)]
    pub explanation: Option<String>,
}

impl Question {
    /// Validate the payload before it is accepted for broadcast: option count,
    /// text bounds, time-limit bounds, and correct answer membership.
    pub fn validate(&self) -> Result<(), ServiceError> {
        let text = self.question_text.trim();
        if text.is_empty() || text.len() > MAX_QUESTION_TEXT_LEN {
            return Err(ServiceError::ValidationFailed(format!(
                "question text must be 1-{MAX_QUESTION_TEXT_LEN} characters"
            )));
        }

        if self.options.len() < 2 || self.options.len() > 6 {
            return Err(ServiceError::ValidationFailed(
                "a question requires between 2 and 6 options".into(),
            ));
        }

        if self.options.iter().any(|option| option.trim().is_empty()) {
            return Err(ServiceError::ValidationFailed(
                "options must not be empty".into(),
            ));
        }

        if !self
            .options
            .iter()
            .any(|option| option.trim().eq_ignore_ascii_case(self.correct_answer.trim()))
        {
            return Err(ServiceError::ValidationFailed(
                "correct answer is not among the options".into(),
            ));
        }

        if let Some(limit) = self.time_limit
            && !(MIN_QUESTION_TIME_LIMIT_SECS..=MAX_QUESTION_TIME_LIMIT_SECS).contains(&limit)
        {
            return Err(ServiceError::ValidationFailed(format!(
                "time limit must be {MIN_QUESTION_TIME_LIMIT_SECS}-{MAX_QUESTION_TIME_LIMIT_SECS} seconds"
            )));
        }

        if let Some(points) = self.points
            && points <= 0
        {
            return Err(ServiceError::ValidationFailed(
                "points override must be strictly positive".into(),
            ));
        }

        Ok(())
    }
}

/// An externally supplied quiz: an ordered list of questions.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Quiz {
    /// Opaque quiz identifier.
    pub quiz_id: String,
    /// Display title.
    pub title: String,
    /// Ordered question list, consumed one at a time as the host advances.
    pub questions: Vec<Question>,
}

/// Supplies completed quiz content by id. Authorship, generation, and
/// persistence of quizzes are out of scope behind this seam.
pub trait QuizProvider: Send + Sync {
    /// Fetch a quiz by id, `None` when unknown.
    fn get_quiz(&self, quiz_id: &str) -> BoxFuture<'static, Option<Quiz>>;
}

/// Resolves a bearer token into a stable opaque host identifier.
/// Participants join anonymously and never pass through this seam.
pub trait IdentityProvider: Send + Sync {
    /// Resolve the caller identity, `None` when the token is unusable.
    fn resolve(&self, token: &str) -> Option<String>;
}

/// Receives the durable post-completion summary. Fire-and-forget: failures
/// must never affect the live session.
pub trait SummarySink: Send + Sync {
    /// Persist one completed-session report.
    fn persist(&self, report: SessionReport) -> BoxFuture<'static, ()>;
}

/// Identity provider that accepts any non-empty token as an opaque stable id.
/// Stands in for a real OAuth-backed resolver in single-node deployments.
#[derive(Debug, Default)]
pub struct OpaqueIdentityProvider;

impl IdentityProvider for OpaqueIdentityProvider {
    fn resolve(&self, token: &str) -> Option<String> {
        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }
}

/// Summary sink that records the report in the logs and drops it.
#[derive(Debug, Default)]
pub struct LoggingSummarySink;

impl SummarySink for LoggingSummarySink {
    fn persist(&self, report: SessionReport) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            info!(
                session_id = %report.session_id,
                participants = report.participant_count,
                average_score = report.average_score,
                "session summary"
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question() -> Question {
        Question {
            question_id: "q1".into(),
            question_text: "Which band recorded Bohemian Rhapsody?".into(),
            options: vec!["Queen".into(), "ABBA".into(), "Kiss".into()],
            correct_answer: "queen".into(),
            time_limit: None,
            points: None,
            difficulty: None,
            category: None,
            explanation: None,
        }
    }

    #[test]
    fn accepts_case_insensitive_correct_answer() {
        assert!(question().validate().is_ok());
    }

    #[test]
    fn rejects_correct_answer_outside_options() {
        let mut q = question();
        q.correct_answer = "The Beatles".into();
        assert!(q.validate().is_err());
    }

    #[test]
    fn rejects_bad_option_counts() {
        let mut q = question();
        q.options = vec!["Queen".into()];
        assert!(q.validate().is_err());

        q.options = (0..7).map(|i| format!("option {i}")).collect();
        q.correct_answer = "option 0".into();
        assert!(q.validate().is_err());
    }

    #[test]
    fn rejects_out_of_bounds_time_limit() {
        let mut q = question();
        q.time_limit = Some(2);
        assert!(q.validate().is_err());
        q.time_limit = Some(301);
        assert!(q.validate().is_err());
        q.time_limit = Some(60);
        assert!(q.validate().is_ok());
    }

    #[test]
    fn rejects_empty_text() {
        let mut q = question();
        q.question_text = "   ".into();
        assert!(q.validate().is_err());
    }
}
