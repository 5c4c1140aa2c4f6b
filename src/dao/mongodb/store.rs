use std::time::{Duration, SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, doc},
    error::{ErrorKind, WriteFailure},
    options::{ClientOptions, IndexOptions},
};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::{
    dao::{
        session_store::{SessionStore, TtlPolicy},
        storage::StorageResult,
    },
    state::{machine::SessionPhase, session::Session},
};

const SESSION_COLLECTION: &str = "sessions";
const JOIN_CODE_COLLECTION: &str = "join_codes";
/// MongoDB duplicate-key error code; signals a lost put-if-absent race.
const DUPLICATE_KEY: i32 = 11000;

struct RetryPolicy;

impl RetryPolicy {
    const MAX_ATTEMPTS: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 250;

    fn initial_delay() -> Duration {
        Duration::from_millis(Self::INITIAL_DELAY_MS)
    }

    fn next_delay(current: Duration) -> Duration {
        (current * 2).min(Duration::from_secs(5))
    }
}

/// Connection settings for the MongoDB session store.
#[derive(Clone)]
pub struct MongoConfig {
    /// Parsed driver options.
    pub options: ClientOptions,
    /// Database holding the session collections.
    pub database_name: String,
}

impl MongoConfig {
    /// Parse a connection URI into a config, defaulting the database name.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let database_name = db_name.unwrap_or("quizfire").to_owned();
        let options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;

        Ok(Self {
            options,
            database_name,
        })
    }
}

/// Session record as stored in MongoDB: the serialized session plus the keys
/// and the expiry deadline the TTL index reclaims on.
#[derive(Debug, Serialize, Deserialize)]
struct SessionDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    join_code: String,
    host_id: String,
    phase: SessionPhase,
    expires_at: DateTime,
    session: Session,
}

/// Join-code index entry pointing back at the primary record.
#[derive(Debug, Serialize, Deserialize)]
struct JoinCodeDocument {
    #[serde(rename = "_id")]
    code: String,
    session_id: Uuid,
    expires_at: DateTime,
}

/// MongoDB-backed [`SessionStore`] relying on TTL indexes for reclamation.
#[derive(Clone)]
pub struct MongoSessionStore {
    database: Database,
    ttl: TtlPolicy,
}

impl MongoSessionStore {
    /// Establish a connection (with bounded retry) and ensure indexes.
    pub async fn connect(config: MongoConfig, ttl: TtlPolicy) -> MongoResult<Self> {
        let client = Client::with_options(config.options.clone())
            .map_err(|source| MongoDaoError::ClientConstruction { source })?;
        let database = client.database(&config.database_name);

        let mut attempts = 0;
        let mut delay = RetryPolicy::initial_delay();
        loop {
            match database.run_command(doc! { "ping": 1 }).await {
                Ok(_) => break,
                Err(err) => {
                    attempts += 1;
                    if attempts >= RetryPolicy::MAX_ATTEMPTS {
                        return Err(MongoDaoError::InitialPing {
                            attempts,
                            source: err,
                        });
                    }
                    sleep(delay).await;
                    delay = RetryPolicy::next_delay(delay);
                }
            }
        }

        let store = Self { database, ttl };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        // expireAfterSeconds = 0 makes `expires_at` itself the deadline.
        let ttl_options = IndexOptions::builder()
            .name(Some("ttl_idx".to_owned()))
            .expire_after(Some(Duration::ZERO))
            .build();

        self.sessions()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "expires_at": 1 })
                    .options(ttl_options.clone())
                    .build(),
            )
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SESSION_COLLECTION,
                index: "expires_at",
                source,
            })?;

        self.join_codes()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "expires_at": 1 })
                    .options(ttl_options)
                    .build(),
            )
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: JOIN_CODE_COLLECTION,
                index: "expires_at",
                source,
            })?;

        self.sessions()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "host_id": 1, "phase": 1 })
                    .options(
                        IndexOptions::builder()
                            .name(Some("host_phase_idx".to_owned()))
                            .build(),
                    )
                    .build(),
            )
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SESSION_COLLECTION,
                index: "host_id,phase",
                source,
            })?;

        Ok(())
    }

    fn sessions(&self) -> Collection<SessionDocument> {
        self.database.collection(SESSION_COLLECTION)
    }

    fn join_codes(&self) -> Collection<JoinCodeDocument> {
        self.database.collection(JOIN_CODE_COLLECTION)
    }

    async fn load(&self, session_id: Uuid) -> MongoResult<Option<Session>> {
        let document = self
            .sessions()
            .find_one(doc! { "_id": session_id.to_string() })
            .await
            .map_err(|source| MongoDaoError::LoadSession {
                id: session_id,
                source,
            })?;

        // The TTL monitor runs periodically; filter records it has not
        // reclaimed yet.
        Ok(document
            .filter(|doc| doc.expires_at > DateTime::now())
            .map(|doc| doc.session))
    }

    async fn save(&self, session: Session) -> MongoResult<()> {
        let id = session.id;
        let ttl = self.ttl.for_phase(&session.phase);
        let expires_at = DateTime::from_system_time(SystemTime::now() + ttl);

        if session.phase.is_terminal() {
            self.join_codes()
                .delete_one(doc! { "_id": &session.join_code, "session_id": id.to_string() })
                .await
                .map_err(|source| MongoDaoError::JoinCode {
                    code: session.join_code.clone(),
                    source,
                })?;
        } else {
            let code_doc = JoinCodeDocument {
                code: session.join_code.clone(),
                session_id: id,
                expires_at,
            };
            self.join_codes()
                .replace_one(doc! { "_id": &code_doc.code }, &code_doc)
                .upsert(true)
                .await
                .map_err(|source| MongoDaoError::JoinCode {
                    code: session.join_code.clone(),
                    source,
                })?;
        }

        let document = SessionDocument {
            id,
            join_code: session.join_code.clone(),
            host_id: session.host_id.clone(),
            phase: session.phase,
            expires_at,
            session,
        };

        self.sessions()
            .replace_one(doc! { "_id": id.to_string() }, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveSession { id, source })?;

        Ok(())
    }

    async fn claim_code(&self, join_code: String, session_id: Uuid) -> MongoResult<bool> {
        let document = JoinCodeDocument {
            code: join_code.clone(),
            session_id,
            expires_at: DateTime::from_system_time(SystemTime::now() + self.ttl.lobby),
        };

        match self.join_codes().insert_one(&document).await {
            Ok(_) => Ok(true),
            Err(err) => match err.kind.as_ref() {
                ErrorKind::Write(WriteFailure::WriteError(write_error))
                    if write_error.code == DUPLICATE_KEY =>
                {
                    Ok(false)
                }
                _ => Err(MongoDaoError::JoinCode {
                    code: join_code,
                    source: err,
                }),
            },
        }
    }
}

impl SessionStore for MongoSessionStore {
    fn get(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Option<Session>>> {
        let store = self.clone();
        Box::pin(async move { store.load(session_id).await.map_err(Into::into) })
    }

    fn get_by_join_code(
        &self,
        join_code: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Session>>> {
        let store = self.clone();
        let join_code = join_code.to_owned();
        Box::pin(async move {
            let pointer = store
                .join_codes()
                .find_one(doc! { "_id": &join_code })
                .await
                .map_err(|source| MongoDaoError::JoinCode {
                    code: join_code.clone(),
                    source,
                })?;

            let Some(pointer) = pointer else {
                return Ok(None);
            };

            match store.load(pointer.session_id).await? {
                Some(session) => Ok(Some(session)),
                None => {
                    // Dangling pointer left behind by primary-record expiry:
                    // resolve to not-found and drop it.
                    let _ = store
                        .join_codes()
                        .delete_one(doc! { "_id": &join_code })
                        .await;
                    Ok(None)
                }
            }
        })
    }

    fn put(&self, session: Session) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save(session).await.map_err(Into::into) })
    }

    fn delete(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .sessions()
                .find_one_and_delete(doc! { "_id": session_id.to_string() })
                .await
                .map_err(|source| MongoDaoError::LoadSession {
                    id: session_id,
                    source,
                })?;

            if let Some(document) = document {
                let _ = store
                    .join_codes()
                    .delete_one(
                        doc! { "_id": &document.join_code, "session_id": session_id.to_string() },
                    )
                    .await;
            }
            Ok(())
        })
    }

    fn try_claim_join_code(
        &self,
        join_code: &str,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let join_code = join_code.to_owned();
        Box::pin(async move {
            store
                .claim_code(join_code, session_id)
                .await
                .map_err(Into::into)
        })
    }

    fn release_join_code(&self, join_code: &str) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let join_code = join_code.to_owned();
        Box::pin(async move {
            store
                .join_codes()
                .delete_one(doc! { "_id": &join_code })
                .await
                .map_err(|source| MongoDaoError::JoinCode {
                    code: join_code,
                    source,
                })?;
            Ok(())
        })
    }

    fn find_active_by_host(
        &self,
        host_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Session>>> {
        let store = self.clone();
        let host_id = host_id.to_owned();
        Box::pin(async move {
            let document = store
                .sessions()
                .find_one(doc! {
                    "host_id": &host_id,
                    "phase": { "$in": ["lobby", "active", "paused"] },
                    "expires_at": { "$gt": DateTime::now() },
                })
                .await
                .map_err(|source| MongoDaoError::Query { source })?;
            Ok(document.map(|doc| doc.session))
        })
    }

    fn list_ids(&self) -> BoxFuture<'static, StorageResult<Vec<Uuid>>> {
        let store = self.clone();
        Box::pin(async move {
            let documents: Vec<SessionDocument> = store
                .sessions()
                .find(doc! { "expires_at": { "$gt": DateTime::now() } })
                .await
                .map_err(|source| MongoDaoError::Query { source })?
                .try_collect()
                .await
                .map_err(|source| MongoDaoError::Query { source })?;
            Ok(documents.into_iter().map(|doc| doc.id).collect())
        })
    }

    fn purge_expired(&self) -> BoxFuture<'static, StorageResult<usize>> {
        // The TTL monitor owns reclamation; the sweep only tidies records the
        // monitor has not visited yet.
        let store = self.clone();
        Box::pin(async move {
            let result = store
                .sessions()
                .delete_many(doc! { "expires_at": { "$lte": DateTime::now() } })
                .await
                .map_err(|source| MongoDaoError::Query { source })?;
            let _ = store
                .join_codes()
                .delete_many(doc! { "expires_at": { "$lte": DateTime::now() } })
                .await;
            Ok(result.deleted_count as usize)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .database
                .run_command(doc! { "ping": 1 })
                .await
                .map_err(|source| MongoDaoError::HealthPing { source })?;
            Ok(())
        })
    }
}
