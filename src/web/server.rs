//! HTTP server assembly
//!
//! Builds the axum router (API namespace, static assets, SPA fallback,
//! metrics) and serves it with graceful shutdown. The server is handed its
//! collaborators through [`AppState`] at construction time; nothing here is
//! process-global.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::http::{header, HeaderValue};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::db::TrialStore;
use crate::lifecycle::ServiceState;
use crate::scheduler::TaskScheduler;

use super::api;
use super::assets::{self, AssetResolver};

// ============================================================================
// App State
// ============================================================================

/// Shared application state, injected into handlers
#[derive(Clone)]
pub struct AppState {
    /// Trial repository
    pub store: TrialStore,

    /// Handle to the ingestion scheduler
    pub scheduler: Arc<TaskScheduler>,

    /// Frontend asset resolver
    pub assets: Arc<AssetResolver>,

    /// Observable service lifecycle state
    pub service_state: watch::Receiver<ServiceState>,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        store: TrialStore,
        scheduler: Arc<TaskScheduler>,
        assets: Arc<AssetResolver>,
        service_state: watch::Receiver<ServiceState>,
    ) -> Self {
        Self {
            store,
            scheduler,
            assets,
            service_state,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// App Server
// ============================================================================

/// Main HTTP server
pub struct AppServer {
    bind_address: SocketAddr,
    cors_origins: Vec<String>,
    state: AppState,
}

impl AppServer {
    /// Create a new server from settings and shared state
    pub fn new(settings: &Settings, state: AppState) -> Self {
        Self {
            bind_address: settings.server.bind_address,
            cors_origins: settings.server.cors_origins.clone(),
            state,
        }
    }

    /// Build the router with all routes.
    ///
    /// Priority order is explicit: the API namespace first, then the static
    /// asset service, then the SPA fallback for everything else.
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .nest("/api/v1", api::create_router())
            .route("/metrics", get(metrics_handler));

        if let Some(root) = self.state.assets.asset_root() {
            router = router.nest_service(
                assets::ASSET_PREFIX,
                ServeDir::new(root.join("assets")),
            );
        }

        router
            .fallback(assets::serve_frontend)
            .layer(cors_layer(&self.cors_origins))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind the listener and serve until the shutdown future resolves.
    ///
    /// Binding happens here, so callers control when the service starts
    /// accepting traffic relative to the rest of startup.
    pub async fn serve_with_shutdown(
        &self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();

        let listener = tokio::net::TcpListener::bind(self.bind_address)
            .await
            .map_err(|e| ServerError::BindError(e.to_string()))?;

        tracing::info!(address = %self.bind_address, "Listening for connections");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))?;

        tracing::info!("HTTP server shutdown complete");
        Ok(())
    }
}

/// Build the CORS layer from the configured origins
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let list: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(list))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Prometheus text exposition endpoint
async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::render(),
    )
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Debug, Clone)]
pub enum ServerError {
    /// Failed to bind to address
    BindError(String),

    /// Server error
    ServeError(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BindError(msg) => write!(f, "Failed to bind: {}", msg),
            Self::ServeError(msg) => write!(f, "Server error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_wildcard() {
        // Should not panic when combining wildcard with Any methods/headers
        let _ = cors_layer(&[String::from("*")]);
    }

    #[test]
    fn test_cors_layer_explicit_origins() {
        let _ = cors_layer(&[
            String::from("http://localhost:5173"),
            String::from("http://localhost:3000"),
        ]);
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::BindError(String::from("address in use"));
        assert!(err.to_string().contains("address in use"));
    }
}
