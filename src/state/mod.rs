//! Shared application state: the session store handle, the real-time hub,
//! per-session write locks, and grace-timer bookkeeping.

pub mod hub;
pub mod machine;
pub mod session;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, watch};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::SessionStore,
    error::ServiceError,
    providers::{IdentityProvider, QuizProvider, SummarySink},
    state::{hub::SessionHub, session::Session},
};

/// Cheaply clonable handle to the shared application state.
pub type SharedState = Arc<AppState>;

/// Central application state injected into every route and service.
///
/// All cross-request session data lives in the store, never in handler-local
/// memory; this struct only carries coordination primitives and collaborator
/// handles, so gateway instances stay stateless relative to session content.
pub struct AppState {
    config: AppConfig,
    store: Arc<dyn SessionStore>,
    quizzes: Arc<dyn QuizProvider>,
    identity: Arc<dyn IdentityProvider>,
    summary_sink: Arc<dyn SummarySink>,
    hub: SessionHub,
    session_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    grace_timers: DashMap<Uuid, watch::Sender<()>>,
}

impl AppState {
    /// Construct the shared state wrapped in an [`Arc`].
    pub fn new(
        config: AppConfig,
        store: Arc<dyn SessionStore>,
        quizzes: Arc<dyn QuizProvider>,
        identity: Arc<dyn IdentityProvider>,
        summary_sink: Arc<dyn SummarySink>,
    ) -> SharedState {
        Arc::new(Self {
            config,
            store,
            quizzes,
            identity,
            summary_sink,
            hub: SessionHub::default(),
            session_locks: DashMap::new(),
            grace_timers: DashMap::new(),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The session store backend.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Quiz content collaborator.
    pub fn quizzes(&self) -> &Arc<dyn QuizProvider> {
        &self.quizzes
    }

    /// Host identity collaborator.
    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }

    /// Post-completion summary collaborator.
    pub fn summary_sink(&self) -> &Arc<dyn SummarySink> {
        &self.summary_sink
    }

    /// The real-time gateway state.
    pub fn hub(&self) -> &SessionHub {
        &self.hub
    }

    /// Apply one atomic read-modify-write to a session.
    ///
    /// The per-session lock serializes every mutation targeting the same
    /// session, so two concurrent commands never interleave their reads and
    /// writes; different sessions proceed fully in parallel. The closure runs
    /// synchronously between the store read and the store write.
    pub async fn with_session<F, T>(&self, session_id: Uuid, mutate: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&mut Session) -> Result<T, ServiceError>,
    {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let Some(mut session) = self.store.get(session_id).await? else {
            self.session_locks.remove(&session_id);
            return Err(ServiceError::SessionNotFound);
        };

        let value = mutate(&mut session)?;
        self.store.put(session).await?;
        Ok(value)
    }

    /// Read-only view of a session, without taking the write lock.
    pub async fn read_session(&self, session_id: Uuid) -> Result<Session, ServiceError> {
        self.store
            .get(session_id)
            .await?
            .ok_or(ServiceError::SessionNotFound)
    }

    /// Resolve a join code to a session id through the store's code index.
    pub async fn resolve_join_code(&self, join_code: &str) -> Result<Uuid, ServiceError> {
        self.store
            .get_by_join_code(join_code)
            .await?
            .map(|session| session.id)
            .ok_or(ServiceError::SessionNotFound)
    }

    /// Write a freshly created session. The id is new, so no lock exists yet.
    pub async fn insert_session(&self, session: Session) -> Result<(), ServiceError> {
        self.store.put(session).await?;
        Ok(())
    }

    /// Drop the write lock entry of a reclaimed session.
    pub fn forget_session_lock(&self, session_id: Uuid) {
        self.session_locks.remove(&session_id);
    }

    /// Arm a fresh grace timer for the session, returning its cancel signal.
    /// Any previously armed timer is implicitly cancelled (its sender drops).
    pub fn arm_grace_timer(&self, session_id: Uuid) -> watch::Receiver<()> {
        let (tx, rx) = watch::channel(());
        self.grace_timers.insert(session_id, tx);
        rx
    }

    /// Cancel the session's grace timer, if armed. Returns whether one was.
    pub fn cancel_grace_timer(&self, session_id: Uuid) -> bool {
        match self.grace_timers.remove(&session_id) {
            Some((_, tx)) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// Forget a timer that has fired; does not signal cancellation.
    pub fn clear_grace_timer(&self, session_id: Uuid) {
        self.grace_timers.remove(&session_id);
    }

    fn session_lock(&self, session_id: Uuid) -> Arc<Mutex<()>> {
        self.session_locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
