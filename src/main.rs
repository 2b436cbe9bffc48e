//! Fantasy Golf Back binary entrypoint wiring REST, SSE, the sync controller
//! and the document store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "couch-store")]
use fantasy_golf_back::dao::document_store::couchdb::{CouchConfig, CouchDocumentStore};
#[cfg(feature = "mongo-store")]
use fantasy_golf_back::dao::document_store::mongodb::{MongoConfig, MongoDocumentStore};
use fantasy_golf_back::{
    config::AppConfig,
    dao::{
        document_store::{DocumentStore, memory::MemoryDocumentStore},
        storage::StorageError,
    },
    routes,
    services::{sse_events, storage_supervisor, sync_service::SyncController},
    state::{AppState, SharedState},
};

/// Storage backend selected with `STORE_BACKEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreBackend {
    #[cfg(feature = "couch-store")]
    Couch,
    #[cfg(feature = "mongo-store")]
    Mongo,
    Memory,
}

impl StoreBackend {
    fn from_env() -> Self {
        match env::var("STORE_BACKEND").ok().as_deref() {
            #[cfg(feature = "couch-store")]
            Some("couch" | "couchdb") => Self::Couch,
            #[cfg(feature = "mongo-store")]
            Some("mongo" | "mongodb") => Self::Mongo,
            Some("memory") => Self::Memory,
            Some(other) => {
                warn!(backend = other, "unknown STORE_BACKEND; using the default backend");
                Self::default_backend()
            }
            None => Self::default_backend(),
        }
    }

    #[allow(unreachable_code)]
    fn default_backend() -> Self {
        #[cfg(feature = "couch-store")]
        return Self::Couch;
        #[cfg(feature = "mongo-store")]
        return Self::Mongo;
        Self::Memory
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let sync = SyncController::spawn(config.sync_settings())
        .context("building the league from the configured roster")?;
    let app_state = AppState::new(config, sync);

    sse_events::spawn_forwarder(app_state.clone());
    spawn_storage_supervisor(app_state.clone(), StoreBackend::from_env());
    // Build the HTTP router once the shared state is ready.
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

/// Start the storage supervisor for the selected backend. The application
/// stays degraded until the first connection succeeds.
fn spawn_storage_supervisor(state: SharedState, backend: StoreBackend) {
    info!(?backend, "starting storage supervisor");
    match backend {
        #[cfg(feature = "couch-store")]
        StoreBackend::Couch => {
            tokio::spawn(storage_supervisor::run(state, || async {
                let config = CouchConfig::from_env()?;
                let store = CouchDocumentStore::connect(config).await?;
                Ok::<Arc<dyn DocumentStore>, StorageError>(Arc::new(store))
            }));
        }
        #[cfg(feature = "mongo-store")]
        StoreBackend::Mongo => {
            tokio::spawn(storage_supervisor::run(state, || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoDocumentStore::connect(config).await?;
                Ok::<Arc<dyn DocumentStore>, StorageError>(Arc::new(store))
            }));
        }
        StoreBackend::Memory => {
            warn!("using the in-memory store; the league is lost on restart");
            let store = MemoryDocumentStore::new();
            tokio::spawn(storage_supervisor::run(state, move || {
                let store = store.clone();
                async move { Ok::<Arc<dyn DocumentStore>, StorageError>(Arc::new(store)) }
            }));
        }
    }
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

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
