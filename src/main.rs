//! Masbaha Back binary entrypoint wiring the room API onto the selected counter store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, bail};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use masbaha_back::{
    config::AppConfig,
    dao::counter_store::memory::MemoryCounterStore,
    routes,
    state::{AppState, SharedState},
};

const STORE_ENV: &str = "MASBAHA_STORE";

/// Backend chosen at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreKind {
    Memory,
    Upstash,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);

    match select_store()? {
        StoreKind::Memory => {
            warn!("using the in-memory counter store; rooms are lost on restart");
            app_state
                .set_store(Arc::new(MemoryCounterStore::new()))
                .await;
        }
        StoreKind::Upstash => spawn_upstash_supervisor(app_state.clone())?,
    }

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

/// Honor `MASBAHA_STORE`, else use the REST store whenever its endpoint is configured.
fn select_store() -> anyhow::Result<StoreKind> {
    match env::var(STORE_ENV).ok().as_deref().map(str::trim) {
        Some("memory") => Ok(StoreKind::Memory),
        Some("upstash") => Ok(StoreKind::Upstash),
        Some(other) if !other.is_empty() => {
            bail!("unknown {STORE_ENV} value `{other}`; expected `memory` or `upstash`")
        }
        _ => Ok(if upstash_configured() {
            StoreKind::Upstash
        } else {
            StoreKind::Memory
        }),
    }
}

#[cfg(feature = "upstash-store")]
fn upstash_configured() -> bool {
    masbaha_back::dao::counter_store::upstash::UpstashConfig::is_configured()
}

#[cfg(not(feature = "upstash-store"))]
fn upstash_configured() -> bool {
    false
}

/// Connect the REST store in the background; the server stays degraded until it answers.
#[cfg(feature = "upstash-store")]
fn spawn_upstash_supervisor(state: SharedState) -> anyhow::Result<()> {
    use masbaha_back::{
        dao::{
            counter_store::{
                CounterStore,
                upstash::{UpstashConfig, UpstashCounterStore},
            },
            storage::StorageError,
        },
        services::storage_supervisor,
    };

    // Fail fast on missing credentials instead of retrying forever.
    let config = UpstashConfig::from_env().context("reading Upstash configuration")?;

    tokio::spawn(storage_supervisor::run(state, move || {
        let config = config.clone();
        async move {
            let store = UpstashCounterStore::connect(config).await?;
            Ok::<_, StorageError>(Arc::new(store) as Arc<dyn CounterStore>)
        }
    }));
    Ok(())
}

#[cfg(not(feature = "upstash-store"))]
fn spawn_upstash_supervisor(_state: SharedState) -> anyhow::Result<()> {
    bail!("{STORE_ENV}=upstash requires the `upstash-store` feature")
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
