//! Participant-facing commands: join, leave, and host moderation.

use std::time::SystemTime;

use tracing::info;
use uuid::Uuid;

use crate::{
    error::ServiceError,
    services::events,
    state::{
        SharedState,
        session::{Participant, Session},
    },
};

/// Join a session by code with a display name.
///
/// Name collisions are resolved by suffixing, not rejected; blacklisted
/// identities are turned away. Late joins into active gameplay are accepted
/// and may answer the in-flight question.
pub async fn join(
    state: &SharedState,
    join_code: &str,
    display_name: &str,
    connection: Uuid,
) -> Result<(Session, Participant), ServiceError> {
    let session_id = state.resolve_join_code(join_code).await?;

    let now = SystemTime::now();
    let name = display_name.to_string();
    let (session, participant) = state
        .with_session(session_id, move |session| {
            let participant = session.join(&name, now)?;
            session.rebind_participant(participant.id, connection, now);
            let participant = session.participants[&participant.id].clone();
            Ok((session.clone(), participant))
        })
        .await?;

    state
        .hub()
        .bind_participant(session_id, participant.id, connection);
    info!(
        session_id = %session_id,
        participant_id = %participant.id,
        display_name = %participant.display_name,
        "participant joined"
    );
    events::broadcast_participant_joined(state, &session, &participant);

    Ok((session, participant))
}

/// Voluntary leave: no blacklist entry, the name is free for reuse.
pub async fn leave(
    state: &SharedState,
    session_id: Uuid,
    participant_id: Uuid,
    connection: Uuid,
) -> Result<(), ServiceError> {
    let departed = state
        .with_session(session_id, move |session| {
            Ok(session
                .leave(participant_id)
                .map(|participant| (session.clone(), participant)))
        })
        .await?;

    state.hub().clear_role(connection);

    if let Some((session, participant)) = departed {
        info!(
            session_id = %session_id,
            participant_id = %participant_id,
            "participant left"
        );
        events::broadcast_participant_left(state, &session, &participant);
    }

    Ok(())
}

/// Host moderation: evict a participant, blacklist its identity, notify its
/// connection, and close the socket. Permanent until `unban`.
pub async fn remove_player(
    state: &SharedState,
    session_id: Uuid,
    participant_id: Uuid,
) -> Result<Participant, ServiceError> {
    let (session, participant) = state
        .with_session(session_id, move |session| {
            let participant = session.remove_participant(participant_id).ok_or_else(|| {
                ServiceError::ValidationFailed(format!(
                    "participant `{participant_id}` is not in this session"
                ))
            })?;
            Ok((session.clone(), participant))
        })
        .await?;

    if let Some(connection) = participant.connection {
        events::send_removed(state, session_id, connection, "removed by the host");
        state.hub().clear_role(connection);
        state.hub().close(connection);
    }

    info!(
        session_id = %session_id,
        participant_id = %participant_id,
        display_name = %participant.display_name,
        "participant removed and blacklisted"
    );
    events::broadcast_participant_left(state, &session, &participant);

    Ok(participant)
}

/// Inverse of `remove_player`: lift the ban for a display name. The player
/// does not rejoin automatically; a fresh join must be submitted.
pub async fn unban_player(
    state: &SharedState,
    session_id: Uuid,
    display_name: &str,
) -> Result<bool, ServiceError> {
    let name = display_name.to_string();
    let lifted = state
        .with_session(session_id, move |session| Ok(session.unban(&name)))
        .await?;

    if lifted {
        info!(session_id = %session_id, display_name, "ban lifted");
    }
    Ok(lifted)
}
