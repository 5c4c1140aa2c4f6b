//! End-to-end gameplay flows driven at the service layer over the in-memory
//! store: lifecycle, scoring bounds, monotonic advancement, and the host
//! disconnect grace window.

mod common;

use std::time::Duration;

use common::{connect, drain_json, events_named, test_state};
use quizfire_back::{
    dto::session::CreateSessionRequest,
    error::ServiceError,
    services::{answer_service, participant_service, session_service, supervisor},
    state::{
        SharedState,
        machine::{Actor, SessionPhase},
        session::Session,
    },
};
use uuid::Uuid;

fn create_request() -> CreateSessionRequest {
    CreateSessionRequest {
        quiz_id: "quiz-1".into(),
        title: Some("Friday night".into()),
        question_time_limit_seconds: Some(30),
    }
}

async fn create_hosted_session(state: &SharedState, host: &str) -> (Session, Uuid) {
    let (host_conn, _host_rx) = connect(state);
    let session = session_service::create_session(
        state,
        host.to_string(),
        Some(host_conn),
        create_request(),
    )
    .await
    .expect("create session");
    state.hub().bind_host(session.id, host_conn);
    (session, host_conn)
}

#[tokio::test]
async fn create_session_returns_lobby_with_join_code() {
    let state = test_state();
    let (session, _) = create_hosted_session(&state, "host-1").await;

    assert_eq!(session.phase, SessionPhase::Lobby);
    assert_eq!(session.join_code.len(), 6);
    assert_eq!(session.title, "Friday night");
    assert_eq!(session.question_count, 3);
    assert!(session.current_question_index.is_none());
}

#[tokio::test]
async fn host_cannot_open_two_sessions_at_once() {
    let state = test_state();
    let _ = create_hosted_session(&state, "host-1").await;

    let err = session_service::create_session(&state, "host-1".into(), None, create_request())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::HostSessionActive));

    // A different host is unaffected.
    assert!(
        session_service::create_session(&state, "host-2".into(), None, create_request())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn unknown_quiz_is_rejected_at_creation() {
    let state = test_state();
    let err = session_service::create_session(
        &state,
        "host-1".into(),
        None,
        CreateSessionRequest {
            quiz_id: "missing".into(),
            title: None,
            question_time_limit_seconds: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationFailed(_)));
}

#[tokio::test]
async fn join_codes_are_unique_across_live_sessions() {
    let state = test_state();
    let mut codes = std::collections::HashSet::new();
    for n in 0..20 {
        let (session, _) = create_hosted_session(&state, &format!("host-{n}")).await;
        assert!(codes.insert(session.join_code.clone()), "duplicate code");
    }
}

#[tokio::test]
async fn full_game_scores_within_bounds_and_rejects_duplicates() {
    let state = test_state();
    let (session, _host_conn) = create_hosted_session(&state, "host-1").await;

    let (alex_conn, mut alex_rx) = connect(&state);
    let (_, alex) = participant_service::join(&state, &session.join_code, "Alex", alex_conn)
        .await
        .expect("join");

    let started = session_service::start_game(&state, session.id)
        .await
        .expect("start");
    assert_eq!(started.phase, SessionPhase::Active);
    assert_eq!(started.current_question_index, Some(0));

    let record = answer_service::submit_answer(&state, session.id, alex.id, 0, "Queen")
        .await
        .expect("answer");
    assert!(record.is_correct);
    assert_eq!(record.base_score, 100);
    // Correct answers earn base plus a time bonus of at most 50%.
    assert!(record.total_score >= 100 && record.total_score <= 150);

    let err = answer_service::submit_answer(&state, session.id, alex.id, 0, "ABBA")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyAnswered));

    let leaderboard = answer_service::leaderboard(&state, session.id).await.unwrap();
    assert_eq!(leaderboard[0].score, record.total_score);

    // The participant stream saw the stripped question, never the answer.
    let frames = drain_json(&mut alex_rx);
    let questions = events_named(&frames, "new_question");
    assert!(!questions.is_empty());
    assert!(questions[0]["question"].get("correct_answer").is_none());
}

#[tokio::test]
async fn host_stream_sees_answer_and_progress() {
    let state = test_state();
    let (host_conn, mut host_rx) = connect(&state);
    let session = session_service::create_session(
        &state,
        "host-1".to_string(),
        Some(host_conn),
        create_request(),
    )
    .await
    .unwrap();
    state.hub().bind_host(session.id, host_conn);

    let (alex_conn, _alex_rx) = connect(&state);
    let (_, alex) = participant_service::join(&state, &session.join_code, "Alex", alex_conn)
        .await
        .unwrap();

    session_service::start_game(&state, session.id).await.unwrap();
    answer_service::submit_answer(&state, session.id, alex.id, 0, "ABBA")
        .await
        .unwrap();

    let frames = drain_json(&mut host_rx);
    let started = events_named(&frames, "question_started");
    assert_eq!(started[0]["question"]["correct_answer"], "Queen");

    let progress = events_named(&frames, "answer_submitted");
    assert_eq!(progress[0]["answered_count"], 1);
    assert!(progress[0].get("selected_answer").is_none());
}

#[tokio::test]
async fn question_index_never_goes_backward() {
    let state = test_state();
    let (session, _) = create_hosted_session(&state, "host-1").await;
    session_service::start_game(&state, session.id).await.unwrap();

    let outcome = session_service::next_question(&state, session.id, 1)
        .await
        .expect("advance");
    let session_after = match outcome {
        session_service::AdvanceOutcome::Advanced(s) => s,
        session_service::AdvanceOutcome::Ended(_) => panic!("should not end"),
    };
    assert_eq!(session_after.current_question_index, Some(1));

    for stale_index in [0, 1] {
        let err = session_service::next_question(&state, session.id, stale_index)
            .await
            .unwrap_err();
        assert!(
            matches!(err, ServiceError::StaleQuestion { .. }),
            "index {stale_index}"
        );
    }
}

#[tokio::test]
async fn advancing_past_the_final_question_completes_the_session() {
    let state = test_state();
    let (session, _) = create_hosted_session(&state, "host-1").await;
    session_service::start_game(&state, session.id).await.unwrap();

    let outcome = session_service::next_question(&state, session.id, 3)
        .await
        .expect("advance past end");
    let ended = match outcome {
        session_service::AdvanceOutcome::Ended(s) => s,
        session_service::AdvanceOutcome::Advanced(_) => panic!("expected completion"),
    };
    assert_eq!(ended.phase, SessionPhase::Completed);
    assert!(ended.summary.is_some());
}

#[tokio::test]
async fn summary_is_host_only_and_requires_completion() {
    let state = test_state();
    let (session, _) = create_hosted_session(&state, "host-1").await;

    // Not completed yet: nothing to serve.
    let err = session_service::session_summary(&state, session.id, "host-1")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SessionNotFound));

    session_service::start_game(&state, session.id).await.unwrap();
    session_service::end_session(&state, session.id, Actor::Host)
        .await
        .unwrap();

    let err = session_service::session_summary(&state, session.id, "intruder")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));

    let report = session_service::session_summary(&state, session.id, "host-1")
        .await
        .expect("host reads summary");
    assert_eq!(report.session_id, session.id);
}

#[tokio::test(start_paused = true)]
async fn host_reconnect_within_grace_window_resumes_gameplay() {
    let state = test_state();
    let (session, host_conn) = create_hosted_session(&state, "host-1").await;
    session_service::start_game(&state, session.id).await.unwrap();

    supervisor::connection_closed(&state, host_conn).await;
    let paused = state.read_session(session.id).await.unwrap();
    assert_eq!(paused.phase, SessionPhase::Paused);
    assert!(paused.host_disconnected_at.is_some());

    tokio::time::sleep(Duration::from_secs(29)).await;

    let (new_conn, _rx) = connect(&state);
    let resumed = session_service::resume_host(&state, session.id, "host-1", new_conn)
        .await
        .expect("resume");
    assert_eq!(resumed.phase, SessionPhase::Active);
    assert_eq!(resumed.current_question_index, Some(0));
    assert!(resumed.host_disconnected_at.is_none());

    // The cancelled timer must not fire later.
    tokio::time::sleep(Duration::from_secs(60)).await;
    let still_active = state.read_session(session.id).await.unwrap();
    assert_eq!(still_active.phase, SessionPhase::Active);
}

#[tokio::test(start_paused = true)]
async fn grace_window_expiry_terminates_the_session() {
    let state = test_state();
    let (session, host_conn) = create_hosted_session(&state, "host-1").await;
    session_service::start_game(&state, session.id).await.unwrap();

    let (alex_conn, _alex_rx) = connect(&state);
    let (_, alex) = participant_service::join(&state, &session.join_code, "Alex", alex_conn)
        .await
        .unwrap();

    supervisor::connection_closed(&state, host_conn).await;
    tokio::time::sleep(Duration::from_secs(31)).await;
    tokio::task::yield_now().await;

    let terminated = state.read_session(session.id).await.unwrap();
    assert_eq!(terminated.phase, SessionPhase::Terminated);

    // All further commands fail: the session is absorbed.
    let err = answer_service::submit_answer(&state, session.id, alex.id, 0, "Queen")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SessionNotActive));
    let err = session_service::start_game(&state, session.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::SessionNotActive));

    // A reconnect attempt after the cutover is refused too.
    let (late_conn, _rx) = connect(&state);
    let err = session_service::resume_host(&state, session.id, "host-1", late_conn)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SessionNotActive));
}

#[tokio::test(start_paused = true)]
async fn lobby_host_disconnect_also_runs_the_grace_timer() {
    let state = test_state();
    let (session, host_conn) = create_hosted_session(&state, "host-1").await;

    supervisor::connection_closed(&state, host_conn).await;
    // Lobbies have no gameplay to pause; the phase stays put.
    let lobby = state.read_session(session.id).await.unwrap();
    assert_eq!(lobby.phase, SessionPhase::Lobby);

    tokio::time::sleep(Duration::from_secs(31)).await;
    tokio::task::yield_now().await;

    let terminated = state.read_session(session.id).await.unwrap();
    assert_eq!(terminated.phase, SessionPhase::Terminated);
}
