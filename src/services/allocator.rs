//! Join-code allocation against the store's put-if-absent code index.

use rand::Rng;
use tracing::error;
use uuid::Uuid;

use crate::{
    config::AppConfig, dao::SessionStore, dto::validation::JOIN_CODE_ALPHABET,
    error::ServiceError,
};

/// Allocate a unique join code for the given session.
///
/// Generation retries a bounded number of times on collision. Exhaustion is
/// an operational alarm, not a user-facing retryable error: at the designed
/// code space (32^6) collisions are negligible at expected concurrency, so
/// running out of attempts means something is badly wrong.
pub async fn allocate(
    store: &dyn SessionStore,
    config: &AppConfig,
    session_id: Uuid,
) -> Result<String, ServiceError> {
    for _ in 0..config.join_code_attempts {
        let code = generate(config.join_code_length);
        if store.try_claim_join_code(&code, session_id).await? {
            return Ok(code);
        }
    }

    error!(
        attempts = config.join_code_attempts,
        "join code allocation exhausted its attempt budget"
    );
    Err(ServiceError::AllocationExhausted)
}

/// Whether a code is currently unclaimed.
pub async fn is_available(
    store: &dyn SessionStore,
    join_code: &str,
) -> Result<bool, ServiceError> {
    Ok(store.get_by_join_code(join_code).await?.is_none())
}

/// Draw a code from the unambiguous alphabet.
fn generate(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| JOIN_CODE_ALPHABET[rng.random_range(0..JOIN_CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dao::{TtlPolicy, memory::InMemorySessionStore};

    fn store() -> InMemorySessionStore {
        InMemorySessionStore::new(TtlPolicy {
            lobby: Duration::from_secs(60),
            active: Duration::from_secs(60),
            terminal: Duration::from_secs(60),
        })
    }

    #[test]
    fn generated_codes_use_the_unambiguous_alphabet() {
        for _ in 0..200 {
            let code = generate(6);
            assert_eq!(code.len(), 6);
            assert!(code.bytes().all(|b| JOIN_CODE_ALPHABET.contains(&b)));
            assert!(!code.contains(['0', 'O', 'I', '1']));
        }
    }

    #[tokio::test]
    async fn allocation_claims_distinct_codes() {
        let store = store();
        let config = AppConfig::default();

        let first = allocate(&store, &config, Uuid::new_v4()).await.unwrap();
        let second = allocate(&store, &config, Uuid::new_v4()).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn availability_follows_the_written_session() {
        let store = store();
        let config = AppConfig::default();

        let session = crate::state::session::Session::new(
            String::new(),
            "quiz-1".into(),
            "title".into(),
            "host-1".into(),
            1,
            30,
            std::time::SystemTime::now(),
        );
        let mut session = session;
        let code = allocate(&store, &config, session.id).await.unwrap();
        session.join_code = code.clone();

        assert!(is_available(&store, &code).await.unwrap());
        store.put(session).await.unwrap();
        assert!(!is_available(&store, &code).await.unwrap());
    }
}
