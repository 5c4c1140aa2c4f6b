//! Quizfire Back binary entrypoint wiring REST, the WebSocket gateway, and
//! the session store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quizfire_back::{
    config::AppConfig,
    dao::{SessionStore, TtlPolicy, memory::InMemorySessionStore},
    providers::{LoggingSummarySink, OpaqueIdentityProvider, catalog::QuizCatalog},
    routes,
    services::supervisor,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let ttl = TtlPolicy::from_config(&config);
    let store = build_store(ttl).await;

    let quizzes = Arc::new(QuizCatalog::load(config.quiz_catalog_path.as_deref()));
    let identity = Arc::new(OpaqueIdentityProvider);
    let summary_sink = Arc::new(LoggingSummarySink);

    let app_state = AppState::new(config, store, quizzes, identity, summary_sink);

    // Background sweep: TTL purge plus participant eviction.
    tokio::spawn(supervisor::run_sweep(app_state.clone()));

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick the session store backend: MongoDB when configured and reachable,
/// the in-memory store otherwise.
#[cfg(feature = "mongo-store")]
async fn build_store(ttl: TtlPolicy) -> Arc<dyn SessionStore> {
    use quizfire_back::dao::mongodb::{MongoConfig, MongoSessionStore};
    use tracing::warn;

    if let Ok(uri) = env::var("MONGO_URI") {
        let db_name = env::var("MONGO_DB").ok();
        match MongoConfig::from_uri(&uri, db_name.as_deref()).await {
            Ok(mongo_config) => match MongoSessionStore::connect(mongo_config, ttl).await {
                Ok(store) => {
                    info!("connected to MongoDB session store");
                    return Arc::new(store);
                }
                Err(err) => {
                    warn!(error = %err, "MongoDB connection failed; falling back to in-memory store");
                }
            },
            Err(err) => {
                warn!(error = %err, "invalid MongoDB configuration; falling back to in-memory store");
            }
        }
    }

    info!("using in-memory session store");
    Arc::new(InMemorySessionStore::new(ttl))
}

/// In-memory store only, when the Mongo backend is compiled out.
#[cfg(not(feature = "mongo-store"))]
async fn build_store(ttl: TtlPolicy) -> Arc<dyn SessionStore> {
    info!("using in-memory session store");
    Arc::new(InMemorySessionStore::new(ttl))
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
