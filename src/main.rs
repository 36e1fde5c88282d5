use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use couchparty::{
    api, broadcast,
    config::AppConfig,
    content::{ContentPool, StaticContentPool},
    state::AppState,
    watchdog, ws,
};

#[tokio::main]
async fn main() {
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
                .unwrap_or_else(|_| "couchparty=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting couchparty...");

    let config = AppConfig::from_env();

    let content: Arc<dyn ContentPool> = match &config.content_path {
        Some(path) => match StaticContentPool::load(path) {
            Ok(pool) => {
                tracing::info!("Loaded content catalog from {}", path.display());
                Arc::new(pool)
            }
            Err(e) => {
                tracing::error!("Failed to load content from {}: {}", path.display(), e);
                return;
            }
        },
        None => {
            tracing::info!("Using built-in content catalog");
            Arc::new(StaticContentPool::builtin())
        }
    };

    let port = config.port;
    let state = Arc::new(AppState::new(content, config));

    // Spawn background task forwarding store changes to clients
    broadcast::spawn_store_forwarder(state.clone());

    // Spawn background task revealing and advancing stalled rounds
    watchdog::spawn_watchdog(state.clone());

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .merge(api::routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
