use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use examroom::{
    api,
    clock::SystemClock,
    config::Config,
    server,
    state::AppState,
    store::DocumentStore,
    sweeper,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "examroom=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting examroom...");
    let config = Config::from_env();

    // The store is the source of truth for answers; refuse to run without it
    let store = match DocumentStore::open(&config.store_path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(
                "Failed to open store at {}: {}",
                config.store_path.display(),
                e
            );
            return ExitCode::FAILURE;
        }
    };

    let listen_addr = config.listen_addr;
    let http_addr = config.http_addr;
    let state = Arc::new(AppState::new(config, store, Arc::new(SystemClock)));
    if let Err(e) = state.restore().await {
        tracing::error!("Failed to restore rooms: {}", e);
        return ExitCode::FAILURE;
    }

    // Ends expired exams even when nobody is connected
    sweeper::spawn_deadline_sweeper(state.clone());

    let listener = match tokio::net::TcpListener::bind(listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", listen_addr, e);
            return ExitCode::FAILURE;
        }
    };
    let http_listener = match tokio::net::TcpListener::bind(http_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", http_addr, e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("Ops endpoints on http://{}", http_addr);
    let app = api::router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, app).await {
            tracing::error!("Ops server stopped: {}", e);
        }
    });

    match server::serve(listener, state).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Line protocol server stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}
