//! Gridiron Back binary entrypoint wiring REST, WebSocket, storage and fan-out layers.

use std::{env, net::SocketAddr};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dao;
mod dto;
mod error;
mod routes;
mod services;
mod state;

use config::AppConfig;
use state::{AppState, DomainEvent, SharedState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_state = AppState::new(AppConfig::load());

    spawn_storage(app_state.clone());
    spawn_fanout_bridge(app_state.clone());
    tokio::spawn(services::websocket_service::run_heartbeat(app_state.clone()));
    tokio::spawn(run_event_logger(app_state.clone()));

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

/// Start the background supervisor that owns the MongoDB connection.
///
/// The server boots in degraded mode and leaves it once the supervisor lands a
/// connection; `MONGO_URI` and `MONGO_DB` configure the target.
#[cfg(feature = "mongo-store")]
fn spawn_storage(state: SharedState) {
    use std::sync::Arc;

    use dao::match_store::{
        MatchStore,
        mongodb::{MongoConfig, MongoMatchStore},
    };

    let mongo_uri = env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
    let mongo_db = env::var("MONGO_DB").ok();

    tokio::spawn(services::storage_supervisor::run(state, move || {
        let uri = mongo_uri.clone();
        let db = mongo_db.clone();
        async move {
            let config = MongoConfig::from_uri(&uri, db.as_deref()).await?;
            let store = MongoMatchStore::connect(config).await?;
            Ok(Arc::new(store) as Arc<dyn MatchStore>)
        }
    }));
}

/// Install the in-memory store for builds without a database backend.
#[cfg(not(feature = "mongo-store"))]
fn spawn_storage(state: SharedState) {
    use std::sync::Arc;

    use dao::match_store::memory::MemoryMatchStore;

    tokio::spawn(async move {
        state
            .install_match_store(Arc::new(MemoryMatchStore::default()))
            .await;
        tracing::warn!("built without mongo-store; match data is process-local");
    });
}

/// Attach the Redis fan-out bridge when `REDIS_URL` is configured.
fn spawn_fanout_bridge(state: SharedState) {
    match env::var("REDIS_URL") {
        Ok(url) if !url.is_empty() => services::fanout_service::spawn_bridge(state, url),
        _ => {
            // Nothing consumes interest updates without a bridge; close the
            // feed instead of letting it queue forever.
            drop(state.take_interest_rx());
            info!("REDIS_URL not set; updates stay within this process");
        }
    }
}

/// Log clock expiries and degraded-mode transitions.
async fn run_event_logger(state: SharedState) {
    let mut events = state.subscribe_domain_events();
    let mut degraded = state.degraded_watcher();
    loop {
        tokio::select! {
            changed = degraded.changed() => {
                if changed.is_err() {
                    break;
                }
                let value = *degraded.borrow_and_update();
                info!(degraded = value, "storage availability changed");
            }
            event = events.recv() => match event {
                Ok(DomainEvent::GameClockExpired { match_id }) => {
                    info!(%match_id, "game clock expired");
                }
                Ok(DomainEvent::PlayClockExpired { match_id }) => {
                    info!(%match_id, "play clock expired");
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
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
