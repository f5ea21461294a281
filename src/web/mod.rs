mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::engine::HarvestEngine;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<HarvestEngine>,
    pub config: Arc<Config>,
}

/// Start the web server and run until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn serve(
    config: Config,
    engine: HarvestEngine,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.web_host, config.web_port)
        .parse()
        .context("Invalid web server address")?;

    let state = AppState {
        engine: Arc::new(engine),
        config: Arc::new(config),
    };

    let app = create_app(state);

    info!(addr = %addr, "Starting HTTP web server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind web server")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Web server error")?;

    Ok(())
}

/// Build the application router.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::router(state.config.upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
