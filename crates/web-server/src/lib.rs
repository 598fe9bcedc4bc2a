use axum::{routing::get, Router};
use database::DbRepository;
use events::SignalBroadcaster;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

pub mod error;
pub mod handlers;

/// The shared application state that all handlers can access.
#[derive(Clone)]
pub struct AppState {
    pub db_repo: DbRepository,
    pub broadcaster: SignalBroadcaster,
}

/// Builds the application routes.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(Any)
        .allow_headers(AllowHeaders::any());

    Router::new()
        .route("/ws", get(handlers::websocket_handler))
        .route("/api/health", get(handlers::health))
        .route("/api/watch-symbols", get(handlers::get_watch_symbols))
        .route("/api/signals/:symbol", get(handlers::get_signals))
        .with_state(Arc::new(state))
        .layer(cors)
        // This middleware will automatically log information about every incoming request.
        .layer(TraceLayer::new_for_http())
}

/// Serves the API and the signal WebSocket until the listener fails.
pub async fn run_server(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Web server listening on http://{}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
