use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle phase of a live quiz session.
///
/// `Terminated` is absorbing: once reached, no further transition is accepted
/// except the idempotent re-application of [`SessionEvent::Terminate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Session created; participants gather, gameplay has not started.
    Lobby,
    /// A question is live (or about to be) and answers are accepted.
    Active,
    /// The host dropped mid-game; gameplay is frozen during the grace window.
    Paused,
    /// Gameplay finished normally; the leaderboard snapshot is frozen.
    Completed,
    /// The session was aborted or reclaimed; absorbing failure state.
    Terminated,
}

impl SessionPhase {
    /// Whether the session has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Terminated)
    }

    /// Whether new participants may join in this phase. Late joins during
    /// active gameplay are accepted; they simply have no answers for
    /// questions that already passed.
    pub fn is_joinable(&self) -> bool {
        matches!(self, SessionPhase::Lobby | SessionPhase::Active)
    }
}

/// Who is asking for a transition. Role checks live here, next to the
/// transition table, so no entry point (REST or gateway) can bypass them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// The session's current host, authenticated by connection binding.
    Host,
    /// A joined participant.
    Participant,
    /// The disconnect/grace-period supervisor acting on timers.
    Supervisor,
}

/// Events that can be applied to a session's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Host starts gameplay from the lobby.
    StartGame,
    /// Host advances to the next question while active.
    NextQuestion,
    /// Supervisor observed the host's connection drop mid-game.
    HostDisconnected,
    /// Host re-established its connection within the grace window.
    HostReconnected,
    /// Gameplay ends normally (host command or automatic after the final question).
    EndSession,
    /// Explicit abort or grace-window expiry; always permitted, idempotent.
    Terminate,
}

/// Error returned when attempting an invalid or unauthorized transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The event cannot be applied from the current phase.
    #[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
    Invalid {
        /// Phase the state machine was in when the event was received.
        from: SessionPhase,
        /// The event that cannot be applied from this phase.
        event: SessionEvent,
    },
    /// The event is not available to the requesting actor.
    #[error("{actor:?} is not allowed to apply {event:?}")]
    Unauthorized {
        /// Actor that issued the event.
        actor: Actor,
        /// The event the actor is not entitled to.
        event: SessionEvent,
    },
}

/// Validate and compute a transition. This is the single checkpoint deciding
/// "is this caller allowed to do this, in this state" for every entry point.
pub fn plan(
    phase: SessionPhase,
    actor: Actor,
    event: SessionEvent,
) -> Result<SessionPhase, TransitionError> {
    authorize(actor, event)?;

    let next = match (phase, event) {
        (SessionPhase::Lobby, SessionEvent::StartGame) => SessionPhase::Active,
        (SessionPhase::Active, SessionEvent::NextQuestion) => SessionPhase::Active,
        (SessionPhase::Active, SessionEvent::HostDisconnected) => SessionPhase::Paused,
        (SessionPhase::Paused, SessionEvent::HostReconnected) => SessionPhase::Active,
        (SessionPhase::Active | SessionPhase::Paused, SessionEvent::EndSession) => {
            SessionPhase::Completed
        }
        // Terminate is accepted from every state, including Terminated itself,
        // so concurrent abort paths settle without error.
        (_, SessionEvent::Terminate) => SessionPhase::Terminated,
        (from, event) => return Err(TransitionError::Invalid { from, event }),
    };

    Ok(next)
}

/// Per-event actor requirements.
fn authorize(actor: Actor, event: SessionEvent) -> Result<(), TransitionError> {
    let allowed = match event {
        SessionEvent::StartGame | SessionEvent::NextQuestion => matches!(actor, Actor::Host),
        SessionEvent::HostDisconnected => matches!(actor, Actor::Supervisor),
        SessionEvent::HostReconnected => matches!(actor, Actor::Host | Actor::Supervisor),
        SessionEvent::EndSession => matches!(actor, Actor::Host | Actor::Supervisor),
        SessionEvent::Terminate => matches!(actor, Actor::Host | Actor::Supervisor),
    };

    if allowed {
        Ok(())
    } else {
        Err(TransitionError::Unauthorized { actor, event })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_happy_path_through_session() {
        let mut phase = SessionPhase::Lobby;
        for (actor, event, expected) in [
            (Actor::Host, SessionEvent::StartGame, SessionPhase::Active),
            (Actor::Host, SessionEvent::NextQuestion, SessionPhase::Active),
            (
                Actor::Supervisor,
                SessionEvent::HostDisconnected,
                SessionPhase::Paused,
            ),
            (
                Actor::Supervisor,
                SessionEvent::HostReconnected,
                SessionPhase::Active,
            ),
            (Actor::Host, SessionEvent::EndSession, SessionPhase::Completed),
        ] {
            phase = plan(phase, actor, event).unwrap();
            assert_eq!(phase, expected);
        }
    }

    #[test]
    fn grace_window_expiry_terminates_paused_session() {
        let phase = plan(
            SessionPhase::Paused,
            Actor::Supervisor,
            SessionEvent::Terminate,
        )
        .unwrap();
        assert_eq!(phase, SessionPhase::Terminated);
    }

    #[test]
    fn terminate_is_idempotent_and_always_permitted() {
        for phase in [
            SessionPhase::Lobby,
            SessionPhase::Active,
            SessionPhase::Paused,
            SessionPhase::Completed,
            SessionPhase::Terminated,
        ] {
            assert_eq!(
                plan(phase, Actor::Host, SessionEvent::Terminate).unwrap(),
                SessionPhase::Terminated
            );
            assert_eq!(
                plan(phase, Actor::Supervisor, SessionEvent::Terminate).unwrap(),
                SessionPhase::Terminated
            );
        }
    }

    #[test]
    fn participants_cannot_drive_the_lifecycle() {
        for event in [
            SessionEvent::StartGame,
            SessionEvent::NextQuestion,
            SessionEvent::EndSession,
            SessionEvent::Terminate,
        ] {
            let err = plan(SessionPhase::Active, Actor::Participant, event).unwrap_err();
            assert!(matches!(err, TransitionError::Unauthorized { .. }), "{event:?}");
        }
    }

    #[test]
    fn supervisor_cannot_start_or_advance_games() {
        for event in [SessionEvent::StartGame, SessionEvent::NextQuestion] {
            let err = plan(SessionPhase::Lobby, Actor::Supervisor, event).unwrap_err();
            assert!(matches!(err, TransitionError::Unauthorized { .. }));
        }
    }

    #[test]
    fn no_gameplay_transitions_out_of_terminal_states() {
        for phase in [SessionPhase::Completed, SessionPhase::Terminated] {
            for event in [
                SessionEvent::StartGame,
                SessionEvent::NextQuestion,
                SessionEvent::EndSession,
            ] {
                let err = plan(phase, Actor::Host, event).unwrap_err();
                assert!(
                    matches!(err, TransitionError::Invalid { .. }),
                    "{phase:?} {event:?}"
                );
            }
        }
    }

    #[test]
    fn start_game_only_from_lobby() {
        for phase in [SessionPhase::Active, SessionPhase::Paused] {
            let err = plan(phase, Actor::Host, SessionEvent::StartGame).unwrap_err();
            assert!(matches!(err, TransitionError::Invalid { .. }));
        }
    }

    #[test]
    fn pause_only_from_active_and_only_by_supervisor() {
        assert!(plan(
            SessionPhase::Lobby,
            Actor::Supervisor,
            SessionEvent::HostDisconnected
        )
        .is_err());
        assert!(matches!(
            plan(
                SessionPhase::Active,
                Actor::Host,
                SessionEvent::HostDisconnected
            ),
            Err(TransitionError::Unauthorized { .. })
        ));
    }

    #[test]
    fn joinability_follows_phase() {
        assert!(SessionPhase::Lobby.is_joinable());
        assert!(SessionPhase::Active.is_joinable());
        assert!(!SessionPhase::Paused.is_joinable());
        assert!(!SessionPhase::Completed.is_joinable());
        assert!(!SessionPhase::Terminated.is_joinable());
    }
}
