use std::sync::Arc;

use axum::extract::ws::Message;
use quizfire_back::{
    config::AppConfig,
    dao::{TtlPolicy, memory::InMemorySessionStore},
    providers::{LoggingSummarySink, OpaqueIdentityProvider, Question, Quiz, catalog::QuizCatalog},
    state::{AppState, SharedState, hub::ClientConnection},
};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

pub fn sample_question(index: usize, correct: &str, wrong: &str) -> Question {
    Question {
        question_id: format!("q{index}"),
        question_text: format!("Question {index}?"),
        options: vec![correct.to_string(), wrong.to_string(), "Neither".to_string()],
        correct_answer: correct.to_string(),
        time_limit: Some(30),
        points: Some(100),
        difficulty: None,
        category: None,
        explanation: None,
    }
}

pub fn sample_quiz() -> Quiz {
    Quiz {
        quiz_id: "quiz-1".into(),
        title: "Music trivia".into(),
        questions: vec![
            sample_question(0, "Queen", "ABBA"),
            sample_question(1, "1970s", "1980s"),
            sample_question(2, "Sony", "Philips"),
        ],
    }
}

pub fn test_state() -> SharedState {
    let config = AppConfig::default();
    let ttl = TtlPolicy::from_config(&config);
    AppState::new(
        config,
        Arc::new(InMemorySessionStore::new(ttl)),
        Arc::new(QuizCatalog::from_quizzes([sample_quiz()])),
        Arc::new(OpaqueIdentityProvider),
        Arc::new(LoggingSummarySink),
    )
}

/// Register a fake gateway connection and return its id plus the receiving
/// end of its writer channel, for asserting on broadcasts.
pub fn connect(state: &SharedState) -> (Uuid, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();
    state.hub().register(ClientConnection { id, tx });
    (id, rx)
}

/// Drain every frame currently queued on a connection, parsed as JSON.
pub fn drain_json(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Value> {
    let mut values = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if let Message::Text(text) = message {
            values.push(serde_json::from_str(&text).expect("outbound frames are JSON"));
        }
    }
    values
}

/// The subset of drained frames carrying the given `event` tag.
pub fn events_named(frames: &[Value], event: &str) -> Vec<Value> {
    frames
        .iter()
        .filter(|frame| frame.get("event").and_then(Value::as_str) == Some(event))
        .cloned()
        .collect()
}
