//! Coaching Matrix binary entrypoint wiring REST, SSE and the session store sync loop.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coaching_matrix::{
    config::AppConfig,
    dao::session_store::{SessionStore, memory::MemoryStore},
    routes,
    services::sync_service,
    state::{AppState, SharedState, identity::FileIdentityStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store = build_store()?;
    let identity = FileIdentityStore::from_env();
    info!(path = %identity.path().display(), "using identity file");

    let app_state = AppState::new(store, Arc::new(identity), config);

    tokio::spawn(sync_service::run(app_state.clone()));
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

/// Pick the session store: CouchDB when `COUCH_BASE_URL` is set, in-process otherwise.
fn build_store() -> anyhow::Result<Arc<dyn SessionStore>> {
    #[cfg(feature = "couch-store")]
    {
        use coaching_matrix::dao::session_store::couchdb::{CouchConfig, CouchSessionStore};

        if env::var_os("COUCH_BASE_URL").is_some() {
            let config = CouchConfig::from_env().context("reading CouchDB settings")?;
            info!(base_url = %config.base_url, database = %config.database, "using CouchDB session store");
            let store = CouchSessionStore::new(config).context("configuring CouchDB store")?;
            return Ok(Arc::new(store));
        }
    }

    info!("no CouchDB configured; using in-process session store");
    Ok(Arc::new(MemoryStore::new()))
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
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
