//! Disconnect and grace-period supervision.
//!
//! Watches host and participant liveness: a host drop mid-game pauses the
//! session and arms a cancellable grace timer whose expiry terminates it; a
//! participant drop only flags the registry entry. A background sweep evicts
//! long-disconnected participants and purges expired store records.

use std::time::SystemTime;

use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::ServiceError,
    services::events,
    state::{
        SharedState,
        hub::ConnectionRole,
        machine::{self, Actor, SessionEvent, SessionPhase},
    },
};

/// React to a gateway connection closing, based on the role it held.
pub async fn connection_closed(state: &SharedState, connection_id: Uuid) {
    match state.hub().unregister(connection_id) {
        Some(ConnectionRole::Host { session_id }) => {
            host_disconnected(state, session_id).await;
        }
        Some(ConnectionRole::Participant {
            session_id,
            participant_id,
        }) => {
            participant_disconnected(state, session_id, participant_id).await;
        }
        None => {}
    }
}

/// Pause an active session (lobbies stay in place) and arm the grace timer.
async fn host_disconnected(state: &SharedState, session_id: Uuid) {
    let now = SystemTime::now();
    let outcome = state
        .with_session(session_id, move |session| {
            if session.phase.is_terminal() {
                return Ok(None);
            }
            session.host_connection = None;
            session.host_disconnected_at = Some(now);
            let paused = if session.phase == SessionPhase::Active {
                session.phase = machine::plan(
                    session.phase,
                    Actor::Supervisor,
                    SessionEvent::HostDisconnected,
                )?;
                true
            } else {
                false
            };
            Ok(Some((session.clone(), paused)))
        })
        .await;

    match outcome {
        Ok(Some((session, paused))) => {
            let grace = state.config().host_grace;
            info!(session_id = %session_id, paused, "host disconnected; grace timer armed");
            if paused {
                events::broadcast_paused(state, &session, grace.as_secs());
            }
            arm_grace_timer(state.clone(), session_id);
        }
        Ok(None) => {}
        Err(ServiceError::SessionNotFound) => {}
        Err(err) => warn!(session_id = %session_id, error = %err, "host disconnect handling failed"),
    }
}

/// Flag the participant as disconnected; score and answers are retained.
async fn participant_disconnected(state: &SharedState, session_id: Uuid, participant_id: Uuid) {
    let now = SystemTime::now();
    let result = state
        .with_session(session_id, move |session| {
            session.mark_participant_disconnected(participant_id, now);
            Ok(())
        })
        .await;

    match result {
        Ok(()) => {
            debug!(session_id = %session_id, participant_id = %participant_id, "participant disconnected")
        }
        Err(ServiceError::SessionNotFound) => {}
        Err(err) => {
            warn!(session_id = %session_id, error = %err, "participant disconnect handling failed")
        }
    }
}

/// Spawn the cancellable grace timer for a disconnected host.
///
/// Cancellation happens through the watch channel when the host re-registers
/// (or when a newer timer replaces this one). The terminal transition
/// re-validates under the session lock, so the timer fires at most once even
/// when racing another terminal transition.
fn arm_grace_timer(state: SharedState, session_id: Uuid) {
    let mut cancel = state.arm_grace_timer(session_id);
    let grace = state.config().host_grace;

    tokio::spawn(async move {
        tokio::select! {
            _ = sleep(grace) => {
                state.clear_grace_timer(session_id);
                fire_grace_timer(&state, session_id).await;
            }
            // Both an explicit cancel and a dropped/replaced sender stand
            // this timer down.
            _ = cancel.changed() => {}
        }
    });
}

/// Grace window elapsed: terminate unconditionally unless the host made it
/// back (or the session already settled) before we took the lock.
async fn fire_grace_timer(state: &SharedState, session_id: Uuid) {
    let now = SystemTime::now();
    let outcome = state
        .with_session(session_id, move |session| {
            if session.host_disconnected_at.is_none() || session.phase.is_terminal() {
                return Ok(None);
            }
            session.phase =
                machine::plan(session.phase, Actor::Supervisor, SessionEvent::Terminate)?;
            session.ended_at = Some(now);
            Ok(Some(session.clone()))
        })
        .await;

    match outcome {
        Ok(Some(_session)) => {
            warn!(session_id = %session_id, "grace window elapsed; session terminated");
            events::broadcast_terminated(
                state,
                session_id,
                "host did not reconnect within the grace window",
            );
            state.hub().remove_session(session_id);
            state.forget_session_lock(session_id);
        }
        Ok(None) => debug!(session_id = %session_id, "grace timer fired after host returned"),
        Err(ServiceError::SessionNotFound) => {}
        Err(err) => warn!(session_id = %session_id, error = %err, "grace timer termination failed"),
    }
}

/// Background sweep loop: purge expired records and evict participants whose
/// disconnection outlived the participant grace window.
pub async fn run_sweep(state: SharedState) {
    let interval = state.config().sweep_interval;
    loop {
        sleep(interval).await;
        if let Err(err) = sweep_once(&state).await {
            warn!(error = %err, "background sweep failed");
        }
    }
}

/// One sweep pass; factored out so tests can drive it directly.
pub async fn sweep_once(state: &SharedState) -> Result<(), ServiceError> {
    let purged = state.store().purge_expired().await?;
    if purged > 0 {
        debug!(purged, "purged expired session records");
    }

    let now = SystemTime::now();
    let grace = state.config().participant_grace;

    for session_id in state.store().list_ids().await? {
        // Read first: a no-op write would refresh the session's TTL and keep
        // idle sessions alive past their window.
        let Ok(session) = state.read_session(session_id).await else {
            continue;
        };
        if session.phase.is_terminal() {
            continue;
        }
        let has_stale = session.participants.values().any(|p| {
            p.disconnected_at
                .and_then(|at| now.duration_since(at).ok())
                .is_some_and(|idle| idle >= grace)
        });
        if !has_stale {
            continue;
        }

        let result = state
            .with_session(session_id, move |session| {
                let evicted = session.evict_stale_participants(now, grace);
                Ok((session.clone(), evicted))
            })
            .await;

        match result {
            Ok((session, evicted)) => {
                for participant in evicted {
                    info!(
                        session_id = %session_id,
                        participant_id = %participant.id,
                        "evicted participant after disconnect grace"
                    );
                    events::broadcast_participant_left(state, &session, &participant);
                }
            }
            Err(ServiceError::SessionNotFound) => {}
            Err(err) => warn!(session_id = %session_id, error = %err, "participant eviction failed"),
        }
    }

    Ok(())
}
