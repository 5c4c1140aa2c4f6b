use std::{
    collections::HashMap,
    time::{Duration, SystemTime},
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::DEFAULT_QUESTION_POINTS,
    error::ServiceError,
    providers::Question,
    services::summary::SessionReport,
    state::machine::SessionPhase,
};

/// Attempts made to derive a unique display name by suffixing before giving up.
const DISPLAY_NAME_SUFFIX_BUDGET: u32 = 64;
/// Display name length bounds after trimming.
const MAX_DISPLAY_NAME_LEN: usize = 32;

/// One connected (or recently disconnected) player within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Stable identifier for the participant within its session.
    pub id: Uuid,
    /// The participant's current real-time connection, if any.
    pub connection: Option<Uuid>,
    /// Unique (case-insensitive) display name, possibly suffixed.
    pub display_name: String,
    /// Cumulative score; monotonically non-decreasing while the game runs.
    pub score: i64,
    /// Number of correctly answered questions.
    pub correct_answers: u32,
    /// Number of submitted answers.
    pub total_answers: u32,
    /// Join timestamp; leaderboard tiebreaker.
    pub joined_at: SystemTime,
    /// Last command or connection activity.
    pub last_activity_at: SystemTime,
    /// Whether a live connection is currently bound.
    pub is_connected: bool,
    /// Cleared on every question advance.
    pub has_answered_current_question: bool,
    /// Set when the connection drops; anchor for the eviction sweep.
    pub disconnected_at: Option<SystemTime>,
}

/// One participant's immutable response to one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    /// Unique identifier of this answer.
    pub id: Uuid,
    /// Who answered.
    pub participant_id: Uuid,
    /// Which question (index into the quiz) was answered.
    pub question_index: usize,
    /// The option the participant selected.
    pub selected_answer: String,
    /// Whether the selection matched the correct answer.
    pub is_correct: bool,
    /// Points of the question before the time bonus.
    pub base_score: i64,
    /// Extra points scaled by remaining time; zero when incorrect or late.
    pub time_bonus: i64,
    /// `base + bonus` when correct, zero otherwise.
    pub total_score: i64,
    /// Submission timestamp.
    pub submitted_at: SystemTime,
    /// Time from question start to submission.
    pub response_time: Duration,
}

/// Identity barred from rejoining after host removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistEntry {
    /// Participant id held at removal time.
    pub participant_id: Uuid,
    /// Lowercased display name held at removal time.
    pub normalized_name: String,
}

/// One row of the deterministic leaderboard ordering.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardEntry {
    /// 1-based position.
    pub rank: usize,
    /// Participant this row describes.
    pub participant_id: Uuid,
    /// Display name at snapshot time.
    pub display_name: String,
    /// Cumulative score.
    pub score: i64,
    /// Correct answer count (first tiebreaker).
    pub correct_answers: u32,
    /// Total answer count.
    pub total_answers: u32,
    /// Whether the participant is currently connected.
    pub is_connected: bool,
}

/// Authoritative state of one live hosted quiz instance.
///
/// Exactly one logical copy exists at a time; every mutation goes through the
/// per-session lock in [`crate::state::AppState`] as an atomic
/// read-modify-write against the session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque unique identifier.
    pub id: Uuid,
    /// Human-shareable code, unique among non-terminal sessions.
    pub join_code: String,
    /// Reference to the externally supplied quiz.
    pub quiz_id: String,
    /// Display title shown in lobbies.
    pub title: String,
    /// Stable identifier of the host, from the identity provider.
    pub host_id: String,
    /// Current lifecycle phase.
    pub phase: SessionPhase,
    /// Index of the live question; `None` while in the lobby.
    pub current_question_index: Option<usize>,
    /// Payload of the live question, including the correct answer
    /// (host-only; stripped from participant views).
    pub current_question: Option<Question>,
    /// Set when a question goes live; scoring clock anchor.
    pub question_started_at: Option<SystemTime>,
    /// Session-wide time limit applied when a question has no override.
    pub question_time_limit_secs: u32,
    /// Number of questions in the quiz, recorded at creation.
    pub question_count: usize,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Set on the lobby-to-active transition.
    pub started_at: Option<SystemTime>,
    /// Set when the session reaches a terminal phase.
    pub ended_at: Option<SystemTime>,
    /// The host's current real-time connection, if bound.
    pub host_connection: Option<Uuid>,
    /// Grace-period anchor; set while the host is disconnected.
    pub host_disconnected_at: Option<SystemTime>,
    /// Participants keyed by id, in join order.
    pub participants: IndexMap<Uuid, Participant>,
    /// Answers for the current question, keyed by participant; rotated on
    /// every question advance. The key set doubles as the dedup check.
    pub current_answers: HashMap<Uuid, AnswerRecord>,
    /// Every answer of the session, for per-question statistics.
    pub answer_log: Vec<AnswerRecord>,
    /// Identities barred from rejoining.
    pub blacklist: Vec<BlacklistEntry>,
    /// Analytics snapshot recorded at completion.
    pub summary: Option<SessionReport>,
}

impl Session {
    /// Build a fresh lobby-phase session.
    pub fn new(
        join_code: String,
        quiz_id: String,
        title: String,
        host_id: String,
        question_count: usize,
        question_time_limit_secs: u32,
        now: SystemTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            join_code,
            quiz_id,
            title,
            host_id,
            phase: SessionPhase::Lobby,
            current_question_index: None,
            current_question: None,
            question_started_at: None,
            question_time_limit_secs,
            question_count,
            created_at: now,
            started_at: None,
            ended_at: None,
            host_connection: None,
            host_disconnected_at: None,
            participants: IndexMap::new(),
            current_answers: HashMap::new(),
            answer_log: Vec::new(),
            blacklist: Vec::new(),
            summary: None,
        }
    }

    /// Add a participant, resolving display-name collisions by suffixing and
    /// enforcing joinability and the blacklist.
    pub fn join(&mut self, display_name: &str, now: SystemTime) -> Result<Participant, ServiceError> {
        if !self.phase.is_joinable() {
            return Err(ServiceError::SessionNotJoinable);
        }

        let trimmed = display_name.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_DISPLAY_NAME_LEN {
            return Err(ServiceError::ValidationFailed(format!(
                "display name must be 1-{MAX_DISPLAY_NAME_LEN} characters"
            )));
        }

        if self.is_name_blacklisted(trimmed) {
            return Err(ServiceError::Blacklisted);
        }

        let unique_name = self.dedup_display_name(trimmed)?;
        let participant = Participant {
            id: Uuid::new_v4(),
            connection: None,
            display_name: unique_name,
            score: 0,
            correct_answers: 0,
            total_answers: 0,
            joined_at: now,
            last_activity_at: now,
            is_connected: true,
            has_answered_current_question: false,
            disconnected_at: None,
        };

        self.participants
            .insert(participant.id, participant.clone());
        Ok(participant)
    }

    /// Resolve a display-name collision by appending " (n)" with the smallest
    /// unique `n >= 2`, within a bounded attempt budget.
    fn dedup_display_name(&self, requested: &str) -> Result<String, ServiceError> {
        if !self.name_taken(requested) {
            return Ok(requested.to_string());
        }

        for n in 2..2 + DISPLAY_NAME_SUFFIX_BUDGET {
            let candidate = format!("{requested} ({n})");
            if !self.name_taken(&candidate) {
                return Ok(candidate);
            }
        }

        Err(ServiceError::DisplayNameConflictUnresolved)
    }

    fn name_taken(&self, candidate: &str) -> bool {
        self.participants
            .values()
            .any(|p| p.display_name.eq_ignore_ascii_case(candidate))
    }

    fn is_name_blacklisted(&self, name: &str) -> bool {
        let normalized = normalize_name(name);
        self.blacklist
            .iter()
            .any(|entry| entry.normalized_name == normalized)
    }

    /// Make `index`/`question` the live question: resets every participant's
    /// per-question flag and rotates the current answer set.
    pub fn advance_question(&mut self, index: usize, question: Question, now: SystemTime) {
        self.current_question_index = Some(index);
        self.current_question = Some(question);
        self.question_started_at = Some(now);
        self.current_answers.clear();
        for participant in self.participants.values_mut() {
            participant.has_answered_current_question = false;
        }
    }

    /// Effective time limit of the live question, honoring its override.
    pub fn effective_time_limit_secs(&self) -> u32 {
        self.current_question
            .as_ref()
            .and_then(|q| q.time_limit)
            .unwrap_or(self.question_time_limit_secs)
    }

    /// Record one answer for the live question.
    ///
    /// The dedup check and the insertion happen inside the same locked
    /// read-modify-write, which closes the race between near-simultaneous
    /// submissions from the same participant.
    pub fn record_answer(
        &mut self,
        participant_id: Uuid,
        question_index: usize,
        selected_answer: &str,
        now: SystemTime,
    ) -> Result<AnswerRecord, ServiceError> {
        if self.phase != SessionPhase::Active {
            return Err(ServiceError::SessionNotActive);
        }

        if self.current_question_index != Some(question_index) {
            return Err(ServiceError::StaleQuestion {
                submitted: question_index,
            });
        }

        if !self.participants.contains_key(&participant_id) {
            return Err(ServiceError::Unauthorized(
                "unknown participant for this session".into(),
            ));
        }

        if self.current_answers.contains_key(&participant_id) {
            return Err(ServiceError::AlreadyAnswered);
        }

        let question = self
            .current_question
            .as_ref()
            .ok_or(ServiceError::SessionNotActive)?;

        let matched = question
            .options
            .iter()
            .find(|option| option.trim().eq_ignore_ascii_case(selected_answer.trim()));
        let Some(matched) = matched else {
            return Err(ServiceError::InvalidOption(selected_answer.to_string()));
        };

        let is_correct = matched
            .trim()
            .eq_ignore_ascii_case(question.correct_answer.trim());
        let base_score = question.points.unwrap_or(DEFAULT_QUESTION_POINTS);
        let started_at = self.question_started_at.unwrap_or(now);
        let response_time = now.duration_since(started_at).unwrap_or_default();
        let time_bonus = if is_correct {
            time_bonus(base_score, self.effective_time_limit_secs(), response_time)
        } else {
            0
        };
        let total_score = if is_correct { base_score + time_bonus } else { 0 };

        let record = AnswerRecord {
            id: Uuid::new_v4(),
            participant_id,
            question_index,
            selected_answer: matched.clone(),
            is_correct,
            base_score,
            time_bonus,
            total_score,
            submitted_at: now,
            response_time,
        };

        let participant = self
            .participants
            .get_mut(&participant_id)
            .expect("participant checked above");
        participant.score += total_score;
        participant.total_answers += 1;
        if is_correct {
            participant.correct_answers += 1;
        }
        participant.has_answered_current_question = true;
        participant.last_activity_at = now;

        self.current_answers.insert(participant_id, record.clone());
        self.answer_log.push(record.clone());

        Ok(record)
    }

    /// Leaderboard with a deterministic total order: score descending, then
    /// correct answers descending, then join time ascending, finally
    /// participant id, so repeated broadcasts never jitter equal rows.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut rows: Vec<&Participant> = self.participants.values().collect();
        rows.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| b.correct_answers.cmp(&a.correct_answers))
                .then_with(|| a.joined_at.cmp(&b.joined_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        rows.into_iter()
            .enumerate()
            .map(|(position, p)| LeaderboardEntry {
                rank: position + 1,
                participant_id: p.id,
                display_name: p.display_name.clone(),
                score: p.score,
                correct_answers: p.correct_answers,
                total_answers: p.total_answers,
                is_connected: p.is_connected,
            })
            .collect()
    }

    /// Number of participants that answered the live question.
    pub fn answered_count(&self) -> usize {
        self.current_answers.len()
    }

    /// Evict the participant and bar its identity from rejoining.
    pub fn remove_participant(&mut self, participant_id: Uuid) -> Option<Participant> {
        let participant = self.participants.shift_remove(&participant_id)?;
        self.blacklist.push(BlacklistEntry {
            participant_id,
            normalized_name: normalize_name(&participant.display_name),
        });
        Some(participant)
    }

    /// Voluntary leave: the participant is dropped without blacklisting.
    pub fn leave(&mut self, participant_id: Uuid) -> Option<Participant> {
        self.participants.shift_remove(&participant_id)
    }

    /// Lift the ban for a display name. The participant does not rejoin
    /// automatically; a fresh join must be submitted.
    pub fn unban(&mut self, display_name: &str) -> bool {
        let normalized = normalize_name(display_name);
        let before = self.blacklist.len();
        self.blacklist
            .retain(|entry| entry.normalized_name != normalized);
        self.blacklist.len() != before
    }

    /// Flip a participant to disconnected without touching score or history.
    pub fn mark_participant_disconnected(&mut self, participant_id: Uuid, now: SystemTime) -> bool {
        let Some(participant) = self.participants.get_mut(&participant_id) else {
            return false;
        };
        participant.is_connected = false;
        participant.connection = None;
        participant.disconnected_at = Some(now);
        true
    }

    /// Re-bind a participant's connection after a reconnect.
    pub fn rebind_participant(
        &mut self,
        participant_id: Uuid,
        connection: Uuid,
        now: SystemTime,
    ) -> bool {
        let Some(participant) = self.participants.get_mut(&participant_id) else {
            return false;
        };
        participant.is_connected = true;
        participant.connection = Some(connection);
        participant.disconnected_at = None;
        participant.last_activity_at = now;
        true
    }

    /// Drop participants whose disconnection exceeded `grace`. Their answers
    /// stay in the answer log.
    pub fn evict_stale_participants(
        &mut self,
        now: SystemTime,
        grace: Duration,
    ) -> Vec<Participant> {
        let stale: Vec<Uuid> = self
            .participants
            .values()
            .filter(|p| {
                p.disconnected_at
                    .and_then(|at| now.duration_since(at).ok())
                    .is_some_and(|idle| idle >= grace)
            })
            .map(|p| p.id)
            .collect();

        stale
            .into_iter()
            .filter_map(|id| self.participants.shift_remove(&id))
            .collect()
    }
}

/// Lowercased, trimmed name used for blacklist comparisons.
fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Up to 50% of the base score, scaled linearly by the remaining time
/// fraction, floored at zero for answers at or past the deadline.
fn time_bonus(base_score: i64, limit_secs: u32, response_time: Duration) -> i64 {
    if limit_secs == 0 {
        return 0;
    }
    let limit = f64::from(limit_secs);
    let elapsed = response_time.as_secs_f64();
    let remaining_fraction = ((limit - elapsed) / limit).max(0.0);
    (base_score as f64 * 0.5 * remaining_fraction).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(points: Option<i64>, time_limit: Option<u32>) -> Question {
        Question {
            question_id: "q0".into(),
            question_text: "Which band recorded Bohemian Rhapsody?".into(),
            options: vec!["Queen".into(), "ABBA".into(), "Kiss".into(), "Blur".into()],
            correct_answer: "Queen".into(),
            time_limit,
            points,
            difficulty: None,
            category: None,
            explanation: None,
        }
    }

    fn active_session() -> Session {
        let now = SystemTime::UNIX_EPOCH;
        let mut session = Session::new(
            "ABCDEF".into(),
            "quiz-1".into(),
            "Friday night".into(),
            "host-1".into(),
            3,
            30,
            now,
        );
        session.phase = SessionPhase::Active;
        session.advance_question(0, question(Some(100), Some(30)), now);
        session
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn join_dedups_display_names_with_suffix() {
        let mut session = active_session();
        session.phase = SessionPhase::Lobby;

        let first = session.join("Alex", at(1)).unwrap();
        let second = session.join("alex", at(2)).unwrap();
        let third = session.join("ALEX", at(3)).unwrap();

        assert_eq!(first.display_name, "Alex");
        assert_eq!(second.display_name, "alex (2)");
        assert_eq!(third.display_name, "ALEX (3)");
    }

    #[test]
    fn join_rejects_bad_names_and_wrong_phase() {
        let mut session = active_session();
        session.phase = SessionPhase::Completed;
        assert!(matches!(
            session.join("Alex", at(1)),
            Err(ServiceError::SessionNotJoinable)
        ));

        session.phase = SessionPhase::Lobby;
        assert!(matches!(
            session.join("   ", at(1)),
            Err(ServiceError::ValidationFailed(_))
        ));
        assert!(matches!(
            session.join(&"x".repeat(33), at(1)),
            Err(ServiceError::ValidationFailed(_))
        ));
    }

    #[test]
    fn late_join_is_accepted_while_active() {
        let mut session = active_session();
        let late = session.join("Latecomer", at(10)).unwrap();
        assert!(session.participants.contains_key(&late.id));

        // The late joiner can still answer the in-flight question.
        let record = session
            .record_answer(late.id, 0, "Queen", at(12))
            .unwrap();
        assert!(record.is_correct);
    }

    #[test]
    fn correct_answer_at_five_seconds_scores_142() {
        let mut session = active_session();
        let participant = session.join("Alex", at(0)).unwrap();

        let record = session
            .record_answer(participant.id, 0, "Queen", at(5))
            .unwrap();

        assert!(record.is_correct);
        assert_eq!(record.base_score, 100);
        assert_eq!(record.time_bonus, 42);
        assert_eq!(record.total_score, 142);
        assert_eq!(session.participants[&participant.id].score, 142);
    }

    #[test]
    fn second_submission_is_rejected_and_score_unchanged() {
        let mut session = active_session();
        let participant = session.join("Alex", at(0)).unwrap();
        session
            .record_answer(participant.id, 0, "Queen", at(5))
            .unwrap();

        let err = session
            .record_answer(participant.id, 0, "ABBA", at(6))
            .unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyAnswered));
        assert_eq!(session.participants[&participant.id].score, 142);
        assert_eq!(session.answer_log.len(), 1);
    }

    #[test]
    fn wrong_answer_scores_zero_but_counts() {
        let mut session = active_session();
        let participant = session.join("Alex", at(0)).unwrap();

        let record = session
            .record_answer(participant.id, 0, "ABBA", at(3))
            .unwrap();

        assert!(!record.is_correct);
        assert_eq!(record.total_score, 0);
        let p = &session.participants[&participant.id];
        assert_eq!(p.score, 0);
        assert_eq!(p.total_answers, 1);
        assert_eq!(p.correct_answers, 0);
        assert!(p.has_answered_current_question);
    }

    #[test]
    fn late_answer_earns_base_score_without_bonus() {
        let mut session = active_session();
        let participant = session.join("Alex", at(0)).unwrap();

        let record = session
            .record_answer(participant.id, 0, "queen", at(45))
            .unwrap();

        assert!(record.is_correct);
        assert_eq!(record.time_bonus, 0);
        assert_eq!(record.total_score, 100);
    }

    #[test]
    fn stale_and_invalid_submissions_are_rejected() {
        let mut session = active_session();
        let participant = session.join("Alex", at(0)).unwrap();

        assert!(matches!(
            session.record_answer(participant.id, 1, "Queen", at(2)),
            Err(ServiceError::StaleQuestion { submitted: 1 })
        ));
        assert!(matches!(
            session.record_answer(participant.id, 0, "Oasis", at(2)),
            Err(ServiceError::InvalidOption(_))
        ));

        session.phase = SessionPhase::Paused;
        assert!(matches!(
            session.record_answer(participant.id, 0, "Queen", at(2)),
            Err(ServiceError::SessionNotActive)
        ));
    }

    #[test]
    fn question_advance_resets_flags_and_answer_rotation() {
        let mut session = active_session();
        let participant = session.join("Alex", at(0)).unwrap();
        session
            .record_answer(participant.id, 0, "Queen", at(5))
            .unwrap();

        session.advance_question(1, question(None, None), at(40));

        assert!(session.current_answers.is_empty());
        assert!(!session.participants[&participant.id].has_answered_current_question);
        assert_eq!(session.answer_log.len(), 1);

        // Answering the new index succeeds and uses the default 100 points.
        let record = session
            .record_answer(participant.id, 1, "Queen", at(70))
            .unwrap();
        assert_eq!(record.base_score, 100);
    }

    #[test]
    fn leaderboard_order_is_deterministic() {
        let mut session = active_session();
        let alex = session.join("Alex", at(1)).unwrap();
        let bob = session.join("Bob", at(2)).unwrap();
        let eve = session.join("Eve", at(3)).unwrap();

        session.record_answer(alex.id, 0, "Queen", at(5)).unwrap();
        session.record_answer(bob.id, 0, "ABBA", at(5)).unwrap();
        session.record_answer(eve.id, 0, "Kiss", at(5)).unwrap();

        let first = session.leaderboard();
        let second = session.leaderboard();
        assert_eq!(
            first.iter().map(|e| e.participant_id).collect::<Vec<_>>(),
            second.iter().map(|e| e.participant_id).collect::<Vec<_>>()
        );

        // Alex leads on score; Bob and Eve tie at zero and order by join time.
        assert_eq!(first[0].participant_id, alex.id);
        assert_eq!(first[1].participant_id, bob.id);
        assert_eq!(first[2].participant_id, eve.id);
        assert_eq!(first[0].rank, 1);
        assert_eq!(first[2].rank, 3);
    }

    #[test]
    fn removal_blacklists_and_unban_lifts_it() {
        let mut session = active_session();
        session.phase = SessionPhase::Lobby;
        let bob = session.join("Bob", at(1)).unwrap();

        session.remove_participant(bob.id).unwrap();
        assert!(matches!(
            session.join("bob", at(2)),
            Err(ServiceError::Blacklisted)
        ));

        assert!(session.unban("Bob"));
        let rejoined = session.join("Bob", at(3)).unwrap();
        assert_eq!(rejoined.display_name, "Bob");
    }

    #[test]
    fn voluntary_leave_does_not_blacklist() {
        let mut session = active_session();
        session.phase = SessionPhase::Lobby;
        let bob = session.join("Bob", at(1)).unwrap();

        session.leave(bob.id).unwrap();
        assert!(session.join("Bob", at(2)).is_ok());
    }

    #[test]
    fn stale_participants_are_evicted_after_grace() {
        let mut session = active_session();
        let alex = session.join("Alex", at(0)).unwrap();
        let bob = session.join("Bob", at(0)).unwrap();

        session.mark_participant_disconnected(bob.id, at(10));

        let evicted = session.evict_stale_participants(at(20), Duration::from_secs(60));
        assert!(evicted.is_empty());

        let evicted = session.evict_stale_participants(at(100), Duration::from_secs(60));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, bob.id);
        assert!(session.participants.contains_key(&alex.id));
    }

    #[test]
    fn disconnect_preserves_score_and_history() {
        let mut session = active_session();
        let alex = session.join("Alex", at(0)).unwrap();
        session.record_answer(alex.id, 0, "Queen", at(5)).unwrap();

        session.mark_participant_disconnected(alex.id, at(6));
        let p = &session.participants[&alex.id];
        assert!(!p.is_connected);
        assert_eq!(p.score, 142);

        session.rebind_participant(alex.id, Uuid::new_v4(), at(8));
        assert!(session.participants[&alex.id].is_connected);
    }
}
