//! HTTP handler definitions.
//!
//! This module defines `AppState` (the shared state carried to every
//! handler) and re-exports the handlers used when building the router.

pub mod api;
pub mod envelope;
pub mod health;
pub mod ping;

pub use api::{DatabaseApi, PublishQueue, RedisGet, RedisSet};
pub use envelope::{
    ApiRequest, DomainHandler, HandlerError, Reply, ResponseJson, CANCELLED_MESSAGE, TIMEOUT_MESSAGE,
};
pub use health::{health_handler, liveness_handler, readiness_handler};
pub use ping::{ping_handler, PING_RESPONSE};

use std::sync::Arc;
use std::time::Instant;

use super::{NetworkConfig, ShutdownController};
use crate::app::Services;

/// Shared application state passed to all handlers.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Capability implementations the domain handlers call into.
    pub services: Services,
    /// Lifecycle controller with state, in-flight tracking, and root token.
    pub shutdown: Arc<ShutdownController>,
    /// Network configuration (bind address, request deadline, grace period).
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(
        services: Services,
        shutdown: Arc<ShutdownController>,
        config: Arc<NetworkConfig>,
    ) -> Self {
        Self {
            services,
            shutdown,
            config,
            start_time: Instant::now(),
        }
    }
}
