//! HTTP status surface.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::session::{SessionRegistry, SessionSummary};

pub const DEFAULT_PORT: u16 = 3000;

pub struct ServerConfig {
    pub port: u16,
    /// Bind on all interfaces and allow cross-origin requests.
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            dev_mode: false,
        }
    }
}

pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub projects: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    active_sessions: Vec<SessionSummary>,
    projects: Vec<String>,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "running",
        active_sessions: state.registry.list_active(),
        projects: state.projects.clone(),
    })
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}

/// Serve until `shutdown` fires.
pub async fn start_server(
    config: ServerConfig,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut app = build_router(state);
    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if config.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "health endpoint listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Server error")?;

    info!("health endpoint shut down");
    Ok(())
}
