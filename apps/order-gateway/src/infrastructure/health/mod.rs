//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, session counts, and Prometheus metrics.
//! Used by container orchestrators, load balancers, and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (checks the core link)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::sessions::SessionRegistry;
use crate::infrastructure::downstream::CoreLink;
use crate::infrastructure::metrics::get_metrics_handle;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "degraded".
    pub status: HealthStatus,
    /// Gateway version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Live session count.
    pub sessions: usize,
    /// Whether the trading core link is up.
    pub core_connected: bool,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Core link up, accepting sessions.
    Healthy,
    /// Core link down; sessions get per-request rejects.
    Degraded,
}

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    registry: Arc<SessionRegistry>,
    core: Option<CoreLink>,
}

impl HealthServerState {
    /// Create new health server state.
    ///
    /// `core` is `None` in tests that run without a real link; readiness then
    /// reports degraded.
    #[must_use]
    pub fn new(version: String, registry: Arc<SessionRegistry>, core: Option<CoreLink>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            registry,
            core,
        }
    }

    fn core_connected(&self) -> bool {
        self.core.as_ref().is_some_and(CoreLink::is_connected)
    }
}

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

/// Error type for health server failures.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Could not bind the listen port.
    #[error("failed to bind health port {0}: {1}")]
    BindFailed(u16, String),
    /// Server failed while running.
    #[error("health server failed: {0}")]
    ServerFailed(String),
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`HealthServerError`] if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    (StatusCode::OK, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.core_connected() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "core link down")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "metrics not initialized".to_string(),
            )
        },
        |handle| (StatusCode::OK, handle.render()),
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let core_connected = state.core_connected();
    HealthResponse {
        status: if core_connected {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        },
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        sessions: state.registry.len(),
        core_connected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_degraded_without_core() {
        let state = HealthServerState::new(
            "test-0.0.1".to_string(),
            Arc::new(SessionRegistry::new()),
            None,
        );
        let response = build_health_response(&state);
        assert_eq!(response.status, HealthStatus::Degraded);
        assert_eq!(response.sessions, 0);
        assert!(!response.core_connected);
    }

    #[test]
    fn session_count_reflected() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, _rx) = tokio::sync::mpsc::channel(4);
        let _handle = registry.on_connect(crate::domain::session::ProtocolVariant::Fix, tx);

        let state = HealthServerState::new("test".to_string(), Arc::clone(&registry), None);
        let response = build_health_response(&state);
        assert_eq!(response.sessions, 1);
    }
}
