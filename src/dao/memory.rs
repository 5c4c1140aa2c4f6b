use std::time::SystemTime;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{
    dao::{
        session_store::{SessionStore, TtlPolicy},
        storage::{StorageError, StorageResult},
    },
    state::{machine::SessionPhase, session::Session},
};

/// Serialized session record with its expiry deadline and the small amount of
/// metadata the sweep needs without deserializing the payload.
struct StoredSession {
    payload: String,
    phase: SessionPhase,
    host_id: String,
    join_code: String,
    expires_at: SystemTime,
}

impl StoredSession {
    fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at <= now
    }
}

/// In-memory TTL store for single-node deployments and tests.
///
/// Sessions are held serialized, exactly like a distributed cache would hold
/// them, so both backends exercise the same round-trip. Expired entries are
/// dropped lazily on read and eagerly by [`SessionStore::purge_expired`].
pub struct InMemorySessionStore {
    sessions: DashMap<Uuid, StoredSession>,
    codes: DashMap<String, Uuid>,
    ttl: TtlPolicy,
}

impl InMemorySessionStore {
    /// Build an empty store applying the given retention policy.
    pub fn new(ttl: TtlPolicy) -> Self {
        Self {
            sessions: DashMap::new(),
            codes: DashMap::new(),
            ttl,
        }
    }

    fn load(&self, session_id: Uuid, now: SystemTime) -> StorageResult<Option<Session>> {
        let Some(entry) = self.sessions.get(&session_id) else {
            return Ok(None);
        };

        if entry.is_expired(now) {
            let join_code = entry.join_code.clone();
            drop(entry);
            self.sessions.remove(&session_id);
            self.codes
                .remove_if(&join_code, |_, target| *target == session_id);
            return Ok(None);
        }

        let session = serde_json::from_str::<Session>(&entry.payload).map_err(|err| {
            StorageError::corrupt(format!("session `{session_id}`"), err)
        })?;
        Ok(Some(session))
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Option<Session>>> {
        let result = self.load(session_id, SystemTime::now());
        Box::pin(async move { result })
    }

    fn get_by_join_code(
        &self,
        join_code: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Session>>> {
        let now = SystemTime::now();
        let result = match self.codes.get(join_code).map(|entry| *entry.value()) {
            Some(session_id) => match self.load(session_id, now) {
                // Dangling pointer after primary-key expiry: not an error.
                Ok(None) => {
                    self.codes
                        .remove_if(join_code, |_, target| *target == session_id);
                    Ok(None)
                }
                other => other,
            },
            None => Ok(None),
        };
        Box::pin(async move { result })
    }

    fn put(&self, session: Session) -> BoxFuture<'static, StorageResult<()>> {
        let result = (|| {
            let payload = serde_json::to_string(&session).map_err(|err| {
                StorageError::corrupt(format!("session `{}`", session.id), err)
            })?;

            let expires_at = SystemTime::now() + self.ttl.for_phase(&session.phase);
            if session.phase.is_terminal() {
                // Terminal sessions release their code for reuse immediately.
                self.codes
                    .remove_if(&session.join_code, |_, target| *target == session.id);
            } else {
                self.codes.insert(session.join_code.clone(), session.id);
            }

            self.sessions.insert(
                session.id,
                StoredSession {
                    payload,
                    phase: session.phase,
                    host_id: session.host_id.clone(),
                    join_code: session.join_code.clone(),
                    expires_at,
                },
            );
            Ok(())
        })();
        Box::pin(async move { result })
    }

    fn delete(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        if let Some((_, stored)) = self.sessions.remove(&session_id) {
            self.codes
                .remove_if(&stored.join_code, |_, target| *target == session_id);
        }
        Box::pin(async move { Ok(()) })
    }

    fn try_claim_join_code(
        &self,
        join_code: &str,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let now = SystemTime::now();
        let claimed = match self.codes.entry(join_code.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(session_id);
                true
            }
            Entry::Occupied(mut slot) => {
                // A code whose session is gone or expired can be reclaimed.
                let holder = *slot.get();
                let stale = self
                    .sessions
                    .get(&holder)
                    .map(|entry| entry.is_expired(now))
                    .unwrap_or(true);
                if stale {
                    slot.insert(session_id);
                    true
                } else {
                    false
                }
            }
        };
        Box::pin(async move { Ok(claimed) })
    }

    fn release_join_code(&self, join_code: &str) -> BoxFuture<'static, StorageResult<()>> {
        self.codes.remove(join_code);
        Box::pin(async move { Ok(()) })
    }

    fn find_active_by_host(
        &self,
        host_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Session>>> {
        let now = SystemTime::now();
        let candidate = self
            .sessions
            .iter()
            .find(|entry| {
                entry.host_id == host_id && !entry.phase.is_terminal() && !entry.is_expired(now)
            })
            .map(|entry| *entry.key());

        let result = match candidate {
            Some(session_id) => self.load(session_id, now),
            None => Ok(None),
        };
        Box::pin(async move { result })
    }

    fn list_ids(&self) -> BoxFuture<'static, StorageResult<Vec<Uuid>>> {
        let now = SystemTime::now();
        let ids = self
            .sessions
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| *entry.key())
            .collect();
        Box::pin(async move { Ok(ids) })
    }

    fn purge_expired(&self) -> BoxFuture<'static, StorageResult<usize>> {
        let now = SystemTime::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, stored| !stored.is_expired(now));
        let purged = before - self.sessions.len();
        self.codes
            .retain(|_, session_id| self.sessions.contains_key(session_id));
        Box::pin(async move { Ok(purged) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn tiny_ttl() -> TtlPolicy {
        TtlPolicy {
            lobby: Duration::from_millis(20),
            active: Duration::from_millis(10),
            terminal: Duration::from_millis(5),
        }
    }

    fn long_ttl() -> TtlPolicy {
        TtlPolicy {
            lobby: Duration::from_secs(60),
            active: Duration::from_secs(60),
            terminal: Duration::from_secs(60),
        }
    }

    fn session(join_code: &str, host: &str) -> Session {
        Session::new(
            join_code.into(),
            "quiz-1".into(),
            "title".into(),
            host.into(),
            3,
            30,
            SystemTime::now(),
        )
    }

    #[tokio::test]
    async fn round_trips_sessions_by_id_and_code() {
        let store = InMemorySessionStore::new(long_ttl());
        let session = session("ABC234", "host-1");
        let id = session.id;

        store.put(session).await.unwrap();

        let by_id = store.get(id).await.unwrap().expect("by id");
        assert_eq!(by_id.join_code, "ABC234");

        let by_code = store.get_by_join_code("ABC234").await.unwrap().unwrap();
        assert_eq!(by_code.id, id);
    }

    #[tokio::test]
    async fn expired_sessions_vanish_and_codes_dangle_to_none() {
        let store = InMemorySessionStore::new(tiny_ttl());
        let session = session("ABC234", "host-1");
        let id = session.id;
        store.put(session).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.get(id).await.unwrap().is_none());
        assert!(store.get_by_join_code("ABC234").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn join_code_claim_is_put_if_absent() {
        let store = InMemorySessionStore::new(long_ttl());
        let first = session("ABC234", "host-1");
        store
            .try_claim_join_code("ABC234", first.id)
            .await
            .unwrap();
        store.put(first).await.unwrap();

        let second = Uuid::new_v4();
        assert!(!store.try_claim_join_code("ABC234", second).await.unwrap());
        assert!(store.try_claim_join_code("XYZ789", second).await.unwrap());
    }

    #[tokio::test]
    async fn stale_code_claims_can_be_reclaimed() {
        let store = InMemorySessionStore::new(long_ttl());
        // A claim whose session was never written is reclaimable.
        store
            .try_claim_join_code("ABC234", Uuid::new_v4())
            .await
            .unwrap();
        assert!(
            store
                .try_claim_join_code("ABC234", Uuid::new_v4())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn terminal_put_releases_the_join_code() {
        let store = InMemorySessionStore::new(long_ttl());
        let mut session = session("ABC234", "host-1");
        store.put(session.clone()).await.unwrap();

        session.phase = SessionPhase::Terminated;
        store.put(session.clone()).await.unwrap();

        assert!(store.get_by_join_code("ABC234").await.unwrap().is_none());
        assert!(
            store
                .try_claim_join_code("ABC234", Uuid::new_v4())
                .await
                .unwrap()
        );
        // The terminated record itself is still readable until its TTL.
        assert!(store.get(session.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn host_index_only_reports_non_terminal_sessions() {
        let store = InMemorySessionStore::new(long_ttl());
        let mut session = session("ABC234", "host-1");
        store.put(session.clone()).await.unwrap();

        assert!(
            store
                .find_active_by_host("host-1")
                .await
                .unwrap()
                .is_some()
        );
        assert!(store.find_active_by_host("other").await.unwrap().is_none());

        session.phase = SessionPhase::Completed;
        store.put(session).await.unwrap();
        assert!(
            store
                .find_active_by_host("host-1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn purge_drops_expired_records() {
        let store = InMemorySessionStore::new(tiny_ttl());
        store.put(session("AAA222", "h1")).await.unwrap();
        store.put(session("BBB333", "h2")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        let purged = store.purge_expired().await.unwrap();
        assert_eq!(purged, 2);
        assert!(store.list_ids().await.unwrap().is_empty());
    }
}
