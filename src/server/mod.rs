//! HTTP trigger for the sync jobs.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::pipeline::Services;

/// Shared application state
pub struct AppState {
    pub services: Services,
    /// Who `GET /` greets.
    pub name: String,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            name: std::env::var("NAME").unwrap_or_else(|_| "World".to_string()),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/patients/update", get(handlers::patients_update))
        .route("/mhlw/reporturl", get(handlers::report_url))
        .route("/mhlw/today", get(handlers::report_today))
        .route("/mhlw/port", get(handlers::port_cases))
        .route("/proxy", get(handlers::proxy))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(services: Services, host: &str, port: u16) -> Result<()> {
    let state = Arc::new(AppState::new(services));
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server...");
}
