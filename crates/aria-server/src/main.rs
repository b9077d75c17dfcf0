//! ARIA voice gateway binary.
//!
//! Starts an axum HTTP server with structured logging, history store
//! initialization, background pruning, and graceful shutdown on
//! SIGTERM/SIGINT.

use aria_db::SqliteHistory;
use aria_server::background::start_history_pruning_task;
use aria_server::config::{self, Config, ConfigError};
use aria_server::registry::ConnectionRegistry;
use aria_server::services::VoiceServices;
use aria_server::{app, AppState};
use aria_voice::{LlmProvider, VoiceError};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum StartupError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to open history store: {0}")]
    Pool(#[from] aria_db::PoolError),

    #[error("failed to get a history connection for migrations: {0}")]
    Connection(#[from] r2d2::Error),

    #[error("failed to run history migrations: {0}")]
    Migration(#[from] aria_db::MigrationError),

    #[error("failed to initialize providers: {0}")]
    Providers(#[from] VoiceError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(std::io::Error),
}

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("ARIA_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // The subscriber may not be installed yet if configuration failed.
        eprintln!("aria-server: {e}");
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let dotenv = dotenvy::dotenv();

    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));
    let config = config::load_config(selected_config_path)?;

    init_tracing(&config);

    if let Ok(path) = dotenv {
        tracing::info!(path = %path.display(), "loaded environment file");
    }
    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );
    tracing::debug!(providers = ?config.providers, "provider configuration");

    if config.providers.default_llm.parse::<LlmProvider>().is_err() {
        tracing::warn!(
            provider = %config.providers.default_llm,
            "default language model is not a known provider; turns without an explicit provider will fail"
        );
    }

    // History store
    let pool = if config.history.path == ":memory:" {
        tracing::warn!("history store is in memory; conversation logs will not survive a restart");
        aria_db::create_memory_pool(config.history.busy_timeout_ms)?
    } else {
        aria_db::create_pool(&config.history.path, config.history.db_settings())?
    };
    {
        let conn = pool.get()?;
        let applied = aria_db::run_migrations(&conn)?;
        if applied > 0 {
            tracing::info!(count = applied, "applied history migrations");
        }
    }
    let history =
        SqliteHistory::new(pool, config.history.ttl()).with_max_entries(config.history.max_entries);

    tokio::spawn(start_history_pruning_task(
        history.clone(),
        config.history.prune_interval_seconds,
    ));

    let services = VoiceServices::from_config(
        &config.providers,
        Arc::new(history),
        config.history.window,
    )?;
    let state = AppState::new(services, config.server.cors_allowed_origin.clone());
    let registry = state.registry.clone();

    let addr = SocketAddr::new(config.server.host, config.server.port);
    tracing::info!(%addr, "starting aria voice gateway");

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal(registry))
        .await
        .map_err(StartupError::Serve)?;

    tracing::info!("aria voice gateway shut down");
    Ok(())
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal, then closes every open
/// voice connection so the server can drain.
async fn shutdown_signal(registry: ConnectionRegistry) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }

    let closed = registry.close_all().await;
    if closed > 0 {
        tracing::info!(count = closed, "closing open voice connections");
    }
}
