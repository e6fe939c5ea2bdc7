//! HTTP API server for the brief gateway
//!
//! Exposes the session dispatch interface to the transport layer: sessions
//! are opened and ended over HTTP, inbound events are posted per session, and
//! observers follow a session's broadcasts over a WebSocket.

mod error;
pub mod health;
pub mod sessions;
pub mod websocket;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

use crate::Result;
use crate::router::TurnRouter;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Session registry and event entry point
    pub turns: Arc<TurnRouter>,
}

/// HTTP API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Create a server for `turns` listening on `port`
    #[must_use]
    pub fn new(turns: Arc<TurnRouter>, port: u16) -> Self {
        Self {
            state: Arc::new(ApiState { turns }),
            port,
        }
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let router = Router::new()
            .merge(health::router())
            .merge(health::status_router(Arc::clone(&self.state)))
            .merge(sessions::router(Arc::clone(&self.state)))
            .merge(websocket::router(Arc::clone(&self.state)));

        // CORS layer for cross-origin requests from the session UI
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
    }

    /// Run the API server until ctrl-c, then end every session
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutdown requested");
                }
            })
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        self.state.turns.shutdown().await;
        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
