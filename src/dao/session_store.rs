use std::time::Duration;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::storage::StorageResult,
    state::{machine::SessionPhase, session::Session},
};

/// Per-phase retention windows applied on every put.
///
/// Retention shrinks as a session moves toward natural disposal: lobbies are
/// kept longest, finished sessions shortest.
#[derive(Debug, Clone, Copy)]
pub struct TtlPolicy {
    /// Retention while in the lobby.
    pub lobby: Duration,
    /// Retention while active or paused.
    pub active: Duration,
    /// Retention once completed or terminated.
    pub terminal: Duration,
}

impl TtlPolicy {
    /// Derive the policy from the application configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            lobby: config.lobby_ttl,
            active: config.active_ttl,
            terminal: config.terminal_ttl,
        }
    }

    /// Retention window for a session in the given phase.
    pub fn for_phase(&self, phase: &SessionPhase) -> Duration {
        match phase {
            SessionPhase::Lobby => self.lobby,
            SessionPhase::Active | SessionPhase::Paused => self.active,
            SessionPhase::Completed | SessionPhase::Terminated => self.terminal,
        }
    }
}

/// Abstraction over the TTL-capable key-value store holding serialized
/// session state, addressed by session id and by join code.
///
/// The store is the only shared mutable resource; serializability per session
/// is provided by the per-session lock in [`crate::state::AppState`], not by
/// the store itself. The join-code index is best-effort: a dangling pointer
/// left behind by primary-record expiry must resolve to "not found".
pub trait SessionStore: Send + Sync {
    /// Fetch a session by primary id.
    fn get(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Option<Session>>>;

    /// Fetch a session through the join-code index.
    fn get_by_join_code(
        &self,
        join_code: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Session>>>;

    /// Full overwrite of a session record; recomputes the TTL from its phase
    /// and keeps the join-code index in step (upserted while non-terminal,
    /// released once terminal).
    fn put(&self, session: Session) -> BoxFuture<'static, StorageResult<()>>;

    /// Remove a session and its join-code mapping.
    fn delete(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<()>>;

    /// Atomic put-if-absent on the join-code index; `false` when the code is
    /// already held by a live session. This is the allocator's uniqueness
    /// authority, no extra locking involved.
    fn try_claim_join_code(
        &self,
        join_code: &str,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Release a join code (failed creation, terminal transition).
    fn release_join_code(&self, join_code: &str) -> BoxFuture<'static, StorageResult<()>>;

    /// Find a host's current non-terminal session, if any.
    fn find_active_by_host(
        &self,
        host_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Session>>>;

    /// Ids of every live (unexpired) session; drives the background sweep.
    fn list_ids(&self) -> BoxFuture<'static, StorageResult<Vec<Uuid>>>;

    /// Drop expired records eagerly. Backends with native TTL reclamation may
    /// treat this as a best-effort supplement.
    fn purge_expired(&self) -> BoxFuture<'static, StorageResult<usize>>;

    /// Probe backend liveness.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
