use axum::extract::ws::Message;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// Handle used to push messages to a connected client.
#[derive(Clone)]
pub struct ClientConnection {
    /// Connection identifier, assigned at upgrade time.
    pub id: Uuid,
    /// Writer channel draining into the socket's dedicated writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Role a connection has established for a session.
///
/// Roles are bound explicitly (create/resume/join) and checked on every
/// privileged command against the current connection, never a static token:
/// a reconnect gets a fresh connection id and must re-register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// The connection controls the session's pacing.
    Host {
        /// Session this connection hosts.
        session_id: Uuid,
    },
    /// The connection belongs to a joined player.
    Participant {
        /// Session the player joined.
        session_id: Uuid,
        /// The player's registry id.
        participant_id: Uuid,
    },
}

impl ConnectionRole {
    /// Session this role is scoped to.
    pub fn session_id(&self) -> Uuid {
        match self {
            ConnectionRole::Host { session_id }
            | ConnectionRole::Participant { session_id, .. } => *session_id,
        }
    }
}

/// Real-time gateway state: connected sockets, per-session broadcast groups,
/// and the session-to-host role-binding table.
#[derive(Default)]
pub struct SessionHub {
    connections: DashMap<Uuid, ClientConnection>,
    roles: DashMap<Uuid, ConnectionRole>,
    members: DashMap<Uuid, Vec<Uuid>>,
    hosts: DashMap<Uuid, Uuid>,
}

impl SessionHub {
    /// Register a socket when its connection is established.
    pub fn register(&self, connection: ClientConnection) {
        self.connections.insert(connection.id, connection);
    }

    /// Drop a socket and every membership it held. Returns the role it had,
    /// so disconnect handling can react (host pause, participant flagging).
    pub fn unregister(&self, connection_id: Uuid) -> Option<ConnectionRole> {
        self.connections.remove(&connection_id);
        self.clear_role(connection_id)
    }

    /// Current role of a connection, if it has established one.
    pub fn role(&self, connection_id: Uuid) -> Option<ConnectionRole> {
        self.roles.get(&connection_id).map(|entry| *entry.value())
    }

    /// Host binding for a session, queried on every privileged command.
    pub fn host_connection(&self, session_id: Uuid) -> Option<Uuid> {
        self.hosts.get(&session_id).map(|entry| *entry.value())
    }

    /// Bind a connection as the session's host and add it to both the
    /// session-wide group and the host-private channel. Any previous host
    /// binding for the session is displaced.
    pub fn bind_host(&self, session_id: Uuid, connection_id: Uuid) {
        self.clear_role(connection_id);
        if let Some(previous) = self.hosts.insert(session_id, connection_id)
            && previous != connection_id
        {
            self.roles.remove(&previous);
            self.remove_member(session_id, previous);
        }
        self.roles
            .insert(connection_id, ConnectionRole::Host { session_id });
        self.add_member(session_id, connection_id);
    }

    /// Bind a connection as a joined participant of the session.
    pub fn bind_participant(&self, session_id: Uuid, participant_id: Uuid, connection_id: Uuid) {
        self.clear_role(connection_id);
        self.roles.insert(
            connection_id,
            ConnectionRole::Participant {
                session_id,
                participant_id,
            },
        );
        self.add_member(session_id, connection_id);
    }

    /// Reverse a connection's role and group memberships (leave/removal).
    pub fn clear_role(&self, connection_id: Uuid) -> Option<ConnectionRole> {
        let (_, role) = self.roles.remove(&connection_id)?;
        self.remove_member(role.session_id(), connection_id);
        if let ConnectionRole::Host { session_id } = role {
            // Only drop the binding if it still points at this connection;
            // a newer host registration must not be displaced.
            self.hosts
                .remove_if(&session_id, |_, bound| *bound == connection_id);
        }
        Some(role)
    }

    /// Drop a session's group and host binding once it reaches a terminal state.
    pub fn remove_session(&self, session_id: Uuid) {
        if let Some((_, members)) = self.members.remove(&session_id) {
            for connection_id in members {
                self.roles.remove(&connection_id);
            }
        }
        self.hosts.remove(&session_id);
    }

    /// Fan an event out to every connection subscribed to the session.
    /// Fire-and-forget: a slow or dead subscriber never stalls the caller.
    pub fn broadcast(&self, session_id: Uuid, payload: &impl Serialize) {
        let Some(message) = serialize(payload) else {
            return;
        };
        let Some(members) = self.members.get(&session_id) else {
            return;
        };
        for connection_id in members.value() {
            self.send_raw(*connection_id, message.clone());
        }
    }

    /// Send an event to the session's host-private channel only.
    pub fn send_to_host(&self, session_id: Uuid, payload: &impl Serialize) {
        let Some(connection_id) = self.host_connection(session_id) else {
            return;
        };
        self.send_to(connection_id, payload);
    }

    /// Send an event to one specific connection.
    pub fn send_to(&self, connection_id: Uuid, payload: &impl Serialize) {
        if let Some(message) = serialize(payload) {
            self.send_raw(connection_id, message);
        }
    }

    /// Ask a connection's writer to close the socket.
    pub fn close(&self, connection_id: Uuid) {
        if let Some(connection) = self.connections.get(&connection_id) {
            let _ = connection.tx.send(Message::Close(None));
        }
    }

    fn send_raw(&self, connection_id: Uuid, message: Message) {
        if let Some(connection) = self.connections.get(&connection_id) {
            let _ = connection.tx.send(message);
        }
    }

    fn add_member(&self, session_id: Uuid, connection_id: Uuid) {
        let mut members = self.members.entry(session_id).or_default();
        if !members.contains(&connection_id) {
            members.push(connection_id);
        }
    }

    fn remove_member(&self, session_id: Uuid, connection_id: Uuid) {
        if let Some(mut members) = self.members.get_mut(&session_id) {
            members.retain(|member| *member != connection_id);
        }
    }
}

/// Serialize a payload into a text frame; serialization failure is a bug in
/// the payload type and is logged rather than propagated.
fn serialize(payload: &impl Serialize) -> Option<Message> {
    match serde_json::to_string(payload) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(err) => {
            warn!(error = %err, "failed to serialize outbound payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(hub: &SessionHub) -> (Uuid, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        hub.register(ClientConnection { id, tx });
        (id, rx)
    }

    #[test]
    fn host_binding_is_displaced_by_reconnect() {
        let hub = SessionHub::default();
        let session_id = Uuid::new_v4();
        let (old, _old_rx) = connection(&hub);
        let (new, _new_rx) = connection(&hub);

        hub.bind_host(session_id, old);
        assert_eq!(hub.host_connection(session_id), Some(old));

        hub.bind_host(session_id, new);
        assert_eq!(hub.host_connection(session_id), Some(new));
        assert!(hub.role(old).is_none());
    }

    #[test]
    fn broadcast_reaches_all_group_members() {
        let hub = SessionHub::default();
        let session_id = Uuid::new_v4();
        let (host, mut host_rx) = connection(&hub);
        let (player, mut player_rx) = connection(&hub);
        let (stranger, mut stranger_rx) = connection(&hub);

        hub.bind_host(session_id, host);
        hub.bind_participant(session_id, Uuid::new_v4(), player);

        hub.broadcast(session_id, &serde_json::json!({"event": "ping"}));

        assert!(host_rx.try_recv().is_ok());
        assert!(player_rx.try_recv().is_ok());
        assert!(stranger_rx.try_recv().is_err());
        let _ = stranger;
    }

    #[test]
    fn unregister_reverses_memberships() {
        let hub = SessionHub::default();
        let session_id = Uuid::new_v4();
        let (player, mut player_rx) = connection(&hub);
        hub.bind_participant(session_id, Uuid::new_v4(), player);

        let role = hub.unregister(player).expect("role");
        assert!(matches!(role, ConnectionRole::Participant { .. }));

        hub.broadcast(session_id, &serde_json::json!({"event": "ping"}));
        assert!(player_rx.try_recv().is_err());
    }

    #[test]
    fn stale_host_unbind_keeps_newer_binding() {
        let hub = SessionHub::default();
        let session_id = Uuid::new_v4();
        let (old, _o) = connection(&hub);
        let (new, _n) = connection(&hub);

        hub.bind_host(session_id, old);
        hub.bind_host(session_id, new);

        // The old connection's cleanup must not displace the new host.
        hub.clear_role(old);
        assert_eq!(hub.host_connection(session_id), Some(new));
    }
}
