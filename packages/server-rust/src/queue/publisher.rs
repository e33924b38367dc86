use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use stackdemo_core::TopicName;

use crate::config::NsqConfig;
use crate::context::RequestContext;
use crate::traits::Publisher;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes through nsqd's HTTP `POST /pub?topic=<topic>` endpoint.
#[derive(Debug, Clone)]
pub struct NsqPublisher {
    client: reqwest::Client,
    pub_url: String,
}

impl NsqPublisher {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &NsqConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("failed to build nsqd HTTP client")?;
        let base = config.nsqd_http.trim_end_matches('/');
        let base = if base.contains("://") {
            base.to_string()
        } else {
            format!("http://{base}")
        };
        Ok(Self {
            client,
            pub_url: format!("{base}/pub"),
        })
    }

    #[must_use]
    pub fn pub_url(&self) -> &str {
        &self.pub_url
    }
}

#[async_trait]
impl Publisher for NsqPublisher {
    async fn publish(
        &self,
        ctx: &RequestContext,
        topic: &TopicName,
        payload: &serde_json::Value,
    ) -> anyhow::Result<()> {
        let body = serde_json::to_vec(payload).context("failed to encode message")?;
        let request = self
            .client
            .post(&self.pub_url)
            .query(&[("topic", topic.as_str())])
            .body(body)
            .send();

        let response = ctx
            .bound(request)
            .await?
            .with_context(|| format!("failed to publish to topic {topic}"))?;
        response
            .error_for_status()
            .with_context(|| format!("nsqd rejected publish to topic {topic}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use parking_lot::Mutex;
    use serde::Deserialize;

    use super::*;

    type Received = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

    #[derive(Deserialize)]
    struct PubQuery {
        topic: String,
    }

    async fn fake_pub(
        State(received): State<Received>,
        Query(query): Query<PubQuery>,
        body: axum::body::Bytes,
    ) -> (StatusCode, &'static str) {
        if query.topic == "rejected" {
            return (StatusCode::BAD_REQUEST, "INVALID_TOPIC");
        }
        let value = serde_json::from_slice(&body).unwrap();
        received.lock().push((query.topic, value));
        (StatusCode::OK, "OK")
    }

    async fn start_fake_nsqd() -> (String, Received) {
        let received = Received::default();
        let app = Router::new()
            .route("/pub", post(fake_pub))
            .with_state(Arc::clone(&received));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (addr.to_string(), received)
    }

    fn config(nsqd_http: &str) -> NsqConfig {
        NsqConfig {
            nsqd_tcp: "127.0.0.1:4150".to_string(),
            nsqd_http: nsqd_http.to_string(),
            topic: "ini_testing_docker".to_string(),
            channel: "ini_channel_docker".to_string(),
            max_in_flight: 50,
            max_attempts: 10,
            requeue_delay_ms: 0,
            max_backoff_ms: 50,
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::detached("test", Duration::from_secs(5))
    }

    #[test]
    fn pub_url_accepts_bare_host() {
        assert_eq!(
            NsqPublisher::new(&config("nsqd:4151")).unwrap().pub_url(),
            "http://nsqd:4151/pub"
        );
        assert_eq!(
            NsqPublisher::new(&config("https://nsqd/")).unwrap().pub_url(),
            "https://nsqd/pub"
        );
    }

    #[tokio::test]
    async fn publishes_json_body_to_topic() {
        let (addr, received) = start_fake_nsqd().await;
        let publisher = NsqPublisher::new(&config(&addr)).unwrap();
        let topic = TopicName::new("ini_testing_docker").unwrap();
        let payload = serde_json::json!({"message": "hi", "id": "7"});

        publisher.publish(&ctx(), &topic, &payload).await.unwrap();

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, "ini_testing_docker");
        assert_eq!(received[0].1, payload);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (addr, _) = start_fake_nsqd().await;
        let publisher = NsqPublisher::new(&config(&addr)).unwrap();
        let topic = TopicName::new("rejected").unwrap();

        let err = publisher
            .publish(&ctx(), &topic, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nsqd rejected publish to topic rejected"));
    }

    #[tokio::test]
    async fn unreachable_nsqd_is_an_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let publisher = NsqPublisher::new(&config(&addr)).unwrap();
        let topic = TopicName::new("ini_testing_docker").unwrap();
        assert!(publisher
            .publish(&ctx(), &topic, &serde_json::json!({}))
            .await
            .is_err());
    }
}
