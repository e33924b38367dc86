//! Network module with deferred startup lifecycle.
//!
//! `new()` creates shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until the shutdown future resolves. The
//! split lets the binary report a bind failure before anything else runs.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context as _;
use axum::routing::{any, get};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use super::config::NetworkConfig;
use super::connection::ClosableListener;
use super::handlers::{
    health_handler, liveness_handler, ping_handler, readiness_handler, AppState, DatabaseApi,
    PublishQueue, RedisGet, RedisSet, ResponseJson,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::app::Services;

/// Owns the HTTP listener and the state shared with every handler.
///
/// 1. `new()` -- allocates the shutdown controller
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- accepts connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
    services: Services,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, services: Services) -> Self {
        Self {
            config,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
            services,
        }
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    #[must_use]
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Assembles the router with all routes and middleware.
    ///
    /// Routes:
    /// - `/ping` -- plain text, any method
    /// - `/api/db`, `/api/redis/get`, `/api/redis/set`, `/api/nsq/set` -- enveloped
    /// - `GET /health`, `/health/live`, `/health/ready` -- probes
    pub fn build_router(&self) -> Router {
        let state = AppState::new(
            self.services.clone(),
            Arc::clone(&self.shutdown),
            Arc::new(self.config.clone()),
        );

        Router::new()
            .route("/ping", any(ping_handler))
            .route_service("/api/db", ResponseJson::new(DatabaseApi, state.clone()))
            .route_service("/api/redis/get", ResponseJson::new(RedisGet, state.clone()))
            .route_service("/api/redis/set", ResponseJson::new(RedisSet, state.clone()))
            .route_service("/api/nsq/set", ResponseJson::new(PublishQueue, state.clone()))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .layer(build_http_layers())
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which differs from the configured
    /// port when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until `shutdown` resolves and every open
    /// connection has finished. Connections still open when the controller
    /// force-closes are severed.
    ///
    /// Consumes `self` because the listener is moved into the server.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server
    /// hits a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .context("start() must be called before serve()")?;
        let listener = ClosableListener::new(listener, self.shutdown.connection_token());
        let router = self.build_router();

        self.shutdown.set_serving();
        info!("Serving HTTP connections");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}
