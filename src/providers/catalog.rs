//! JSON-file-backed quiz provider used for single-node deployments and tests.

use std::{collections::HashMap, fs, path::Path};

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{info, warn};

use super::{Question, Quiz, QuizProvider};

/// Quiz provider serving a catalog loaded once from disk.
///
/// The catalog file is a JSON array of quizzes. When no file is configured or
/// it cannot be parsed, the provider falls back to a single built-in demo
/// quiz so the server stays usable out of the box.
pub struct QuizCatalog {
    quizzes: HashMap<String, Quiz>,
}

impl QuizCatalog {
    /// Load the catalog from the given path, falling back to the demo quiz.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            info!("no quiz catalog configured; serving the built-in demo quiz");
            return Self::demo();
        };

        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Vec<RawQuiz>>(&contents) {
                Ok(raw) => {
                    let quizzes: HashMap<String, Quiz> = raw
                        .into_iter()
                        .map(Quiz::from)
                        .map(|quiz| (quiz.quiz_id.clone(), quiz))
                        .collect();
                    info!(path = %path.display(), count = quizzes.len(), "loaded quiz catalog");
                    Self { quizzes }
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to parse quiz catalog; using demo quiz");
                    Self::demo()
                }
            },
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read quiz catalog; using demo quiz");
                Self::demo()
            }
        }
    }

    /// Build a catalog from already-constructed quizzes (test seam).
    pub fn from_quizzes(quizzes: impl IntoIterator<Item = Quiz>) -> Self {
        Self {
            quizzes: quizzes
                .into_iter()
                .map(|quiz| (quiz.quiz_id.clone(), quiz))
                .collect(),
        }
    }

    fn demo() -> Self {
        Self::from_quizzes([demo_quiz()])
    }
}

impl QuizProvider for QuizCatalog {
    fn get_quiz(&self, quiz_id: &str) -> BoxFuture<'static, Option<Quiz>> {
        let quiz = self.quizzes.get(quiz_id).cloned();
        Box::pin(async move { quiz })
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of one catalog quiz.
struct RawQuiz {
    quiz_id: String,
    title: String,
    questions: Vec<Question>,
}

impl From<RawQuiz> for Quiz {
    fn from(raw: RawQuiz) -> Self {
        Self {
            quiz_id: raw.quiz_id,
            title: raw.title,
            questions: raw.questions,
        }
    }
}

/// Built-in quiz shipped with the binary.
fn demo_quiz() -> Quiz {
    Quiz {
        quiz_id: "demo".into(),
        title: "Music trivia warm-up".into(),
        questions: vec![
            Question {
                question_id: "demo-1".into(),
                question_text: "Which band recorded Bohemian Rhapsody?".into(),
                options: vec![
                    "Queen".into(),
                    "Led Zeppelin".into(),
                    "The Rolling Stones".into(),
                    "ABBA".into(),
                ],
                correct_answer: "Queen".into(),
                time_limit: Some(30),
                points: Some(100),
                difficulty: Some("easy".into()),
                category: Some("music".into()),
                explanation: None,
            },
            Question {
                question_id: "demo-2".into(),
                question_text: "In which decade was the Walkman introduced?".into(),
                options: vec!["1960s".into(), "1970s".into(), "1980s".into()],
                correct_answer: "1970s".into(),
                time_limit: Some(20),
                points: None,
                difficulty: Some("medium".into()),
                category: Some("music".into()),
                explanation: Some("Sony released the first Walkman in 1979.".into()),
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_path_serves_demo_quiz() {
        let catalog = QuizCatalog::load(None);
        let quiz = catalog.get_quiz("demo").await.expect("demo quiz");
        assert!(!quiz.questions.is_empty());
        for question in &quiz.questions {
            question.validate().expect("demo questions are valid");
        }
    }

    #[tokio::test]
    async fn unknown_quiz_id_returns_none() {
        let catalog = QuizCatalog::load(None);
        assert!(catalog.get_quiz("nope").await.is_none());
    }
}
