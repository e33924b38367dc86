//! Domain handlers behind the enveloped `/api/*` endpoints.
//!
//! Every failure is logged with its full cause and request id, then
//! reported to the client only through the endpoint's generic message.

use async_trait::async_trait;
use axum::http::HeaderMap;
use stackdemo_core::{Payment, PaymentOrder, QueueMessage, VisitorCount};
use tracing::error;

use super::envelope::{ApiRequest, DomainHandler, Reply};
use super::AppState;
use crate::context::RequestContext;

pub const DATABASE_FAILURE: &str = "Gagal get data dari database";
pub const REDIS_GET_FAILURE: &str = "Gagal get data dari redis";
pub const REDIS_SET_FAILURE: &str = "Gagal increment data redis";
pub const QUEUE_FAILURE: &str = "Gagal publish data to nsq";

/// `/api/db`: payments ordered by `order_by` / `order_from`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseApi;

#[async_trait]
impl DomainHandler for DatabaseApi {
    type Payload = Vec<Payment>;

    async fn handle(
        &self,
        state: &AppState,
        ctx: &RequestContext,
        request: &ApiRequest,
        _headers: &mut HeaderMap,
    ) -> Reply<Vec<Payment>> {
        let order = match PaymentOrder::parse(
            request.form_value("order_by"),
            request.form_value("order_from"),
        ) {
            Ok(order) => order,
            Err(e) => {
                error!(request_id = %ctx.request_id(), error = %e, "rejected payment ordering");
                return Reply::err(DATABASE_FAILURE);
            }
        };

        match state.services.records.get_all(ctx, order).await {
            Ok(payments) => Reply::ok(payments),
            Err(e) => {
                error!(request_id = %ctx.request_id(), error = format!("{e:#}"), "failed to load payments");
                Reply::err(DATABASE_FAILURE)
            }
        }
    }
}

/// `/api/redis/get`: the visitor counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisGet;

#[async_trait]
impl DomainHandler for RedisGet {
    type Payload = VisitorCount;

    async fn handle(
        &self,
        state: &AppState,
        ctx: &RequestContext,
        _request: &ApiRequest,
        _headers: &mut HeaderMap,
    ) -> Reply<VisitorCount> {
        match state.services.counter.get(ctx).await {
            Ok(visitor) => Reply::ok(VisitorCount { visitor }),
            Err(e) => {
                error!(request_id = %ctx.request_id(), error = format!("{e:#}"), "failed to read visitor counter");
                Reply::err(REDIS_GET_FAILURE)
            }
        }
    }
}

/// `/api/redis/set`: increments the visitor counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisSet;

#[async_trait]
impl DomainHandler for RedisSet {
    type Payload = serde_json::Map<String, serde_json::Value>;

    async fn handle(
        &self,
        state: &AppState,
        ctx: &RequestContext,
        _request: &ApiRequest,
        _headers: &mut HeaderMap,
    ) -> Reply<Self::Payload> {
        match state.services.counter.increment(ctx).await {
            Ok(()) => Reply::ok(serde_json::Map::new()),
            Err(e) => {
                error!(request_id = %ctx.request_id(), error = format!("{e:#}"), "failed to increment visitor counter");
                Reply::err(REDIS_SET_FAILURE)
            }
        }
    }
}

/// `/api/nsq/set`: publishes the `message` and `id` form fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishQueue;

#[async_trait]
impl DomainHandler for PublishQueue {
    type Payload = serde_json::Map<String, serde_json::Value>;

    async fn handle(
        &self,
        state: &AppState,
        ctx: &RequestContext,
        request: &ApiRequest,
        _headers: &mut HeaderMap,
    ) -> Reply<Self::Payload> {
        let message = QueueMessage {
            message: request.form_value("message").to_string(),
            id: request.form_value("id").to_string(),
        };
        let payload = match serde_json::to_value(&message) {
            Ok(payload) => payload,
            Err(e) => {
                error!(request_id = %ctx.request_id(), error = %e, "failed to encode queue message");
                return Reply::err(QUEUE_FAILURE);
            }
        };

        let topic = &state.services.queue_topic;
        match state.services.publisher.publish(ctx, topic, &payload).await {
            Ok(()) => Reply::ok(serde_json::Map::new()),
            Err(e) => {
                error!(request_id = %ctx.request_id(), %topic, error = format!("{e:#}"), "failed to publish message");
                Reply::err(QUEUE_FAILURE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use stackdemo_core::TopicName;

    use super::*;
    use crate::app::Services;
    use crate::network::{NetworkConfig, ShutdownController};
    use crate::storage::{MemoryCounterStore, MemoryPublisher, MemoryRecordStore};

    fn state_with(services: Services) -> AppState {
        AppState::new(
            services,
            Arc::new(ShutdownController::new()),
            Arc::new(NetworkConfig::default()),
        )
    }

    fn ctx() -> RequestContext {
        RequestContext::detached("test", Duration::from_secs(5))
    }

    async fn request(uri: &str) -> ApiRequest {
        ApiRequest::from_request(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    fn services(publisher: Arc<MemoryPublisher>) -> Services {
        Services {
            records: Arc::new(MemoryRecordStore::with_rows(vec![
                Payment {
                    id: 1,
                    customer_name: "budi".to_string(),
                },
                Payment {
                    id: 2,
                    customer_name: "andi".to_string(),
                },
            ])),
            counter: Arc::new(MemoryCounterStore::starting_at(4)),
            publisher,
            queue_topic: TopicName::new("ini_testing_docker").unwrap(),
        }
    }

    #[tokio::test]
    async fn database_orders_by_request_parameters() {
        let state = state_with(services(Arc::new(MemoryPublisher::new())));
        let reply = DatabaseApi
            .handle(
                &state,
                &ctx(),
                &request("/api/db?order_by=customer_name&order_from=asc").await,
                &mut HeaderMap::new(),
            )
            .await;

        let names: Vec<_> = reply
            .data
            .unwrap()
            .into_iter()
            .map(|p| p.customer_name)
            .collect();
        assert_eq!(names, vec!["andi", "budi"]);
    }

    #[tokio::test]
    async fn database_rejects_unknown_ordering_with_generic_message() {
        let state = state_with(services(Arc::new(MemoryPublisher::new())));
        let reply = DatabaseApi
            .handle(
                &state,
                &ctx(),
                &request("/api/db?order_by=id;DROP%20TABLE%20payments").await,
                &mut HeaderMap::new(),
            )
            .await;

        assert!(reply.data.is_none());
        assert_eq!(reply.error.unwrap().message(), DATABASE_FAILURE);
    }

    #[tokio::test]
    async fn counter_get_then_increment() {
        let state = state_with(services(Arc::new(MemoryPublisher::new())));
        let req = request("/").await;

        let before = RedisGet
            .handle(&state, &ctx(), &req, &mut HeaderMap::new())
            .await;
        assert_eq!(before.data.unwrap().visitor, 4);

        let set = RedisSet
            .handle(&state, &ctx(), &req, &mut HeaderMap::new())
            .await;
        assert!(set.data.unwrap().is_empty());

        let after = RedisGet
            .handle(&state, &ctx(), &req, &mut HeaderMap::new())
            .await;
        assert_eq!(after.data.unwrap().visitor, 5);
    }

    #[tokio::test]
    async fn publish_sends_form_fields_to_queue_topic() {
        let publisher = Arc::new(MemoryPublisher::new());
        let state = state_with(services(Arc::clone(&publisher)));

        let reply = PublishQueue
            .handle(
                &state,
                &ctx(),
                &request("/api/nsq/set?message=halo&id=9").await,
                &mut HeaderMap::new(),
            )
            .await;

        assert!(reply.error.is_none());
        assert_eq!(
            publisher.messages("ini_testing_docker"),
            vec![serde_json::json!({ "message": "halo", "id": "9" })]
        );
    }
}
