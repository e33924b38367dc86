//! Health, liveness, and readiness endpoint handlers.
//!
//! These sit outside the envelope and expose lifecycle information for
//! orchestrators and load balancers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::LifecycleState;

/// Returns detailed health information as JSON.
///
/// Always returns 200 -- the `state` field tells monitoring tools whether
/// the server is serving or draining.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let lifecycle = state.shutdown.state();
    let in_flight = state.shutdown.in_flight_count();
    let uptime_secs = state.start_time.elapsed().as_secs();

    Json(json!({
        "state": lifecycle.as_str(),
        "in_flight": in_flight,
        "uptime_secs": uptime_secs,
    }))
}

/// Liveness probe -- always returns 200 OK.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe -- returns 200 while serving, 503 otherwise.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.state() == LifecycleState::Serving {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stackdemo_core::TopicName;

    use super::*;
    use crate::app::Services;
    use crate::network::{NetworkConfig, ShutdownController};

    fn test_state() -> AppState {
        AppState::new(
            Services::in_memory(TopicName::new("ini_testing_docker").unwrap()),
            Arc::new(ShutdownController::new()),
            Arc::new(NetworkConfig::default()),
        )
    }

    #[tokio::test]
    async fn health_handler_returns_json_with_all_fields() {
        let state = test_state();
        state.shutdown.set_serving();

        let json = health_handler(State(state)).await.0;

        assert_eq!(json["state"], "serving");
        assert_eq!(json["in_flight"], 0);
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn health_handler_reports_shutting_down_state() {
        let state = test_state();
        state.shutdown.set_serving();
        state.shutdown.trigger_shutdown();

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["state"], "shutting_down");
    }

    #[tokio::test]
    async fn health_handler_reports_in_flight_count() {
        let state = test_state();
        let _guard = state.shutdown.in_flight_guard();

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["in_flight"], 1);
    }

    #[tokio::test]
    async fn liveness_handler_always_returns_200() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_lifecycle() {
        let state = test_state();
        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.shutdown.set_serving();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);

        state.shutdown.trigger_shutdown();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
