//! Shutdown behaviour against a real listener.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stackdemo_core::TopicName;
use stackdemo_server::network::{run_until_signal, LifecycleState, NetworkConfig, NetworkModule};
use stackdemo_server::storage::{MemoryPublisher, MemoryRecordStore};
use stackdemo_server::{CounterStore, RequestContext, Services};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Counter whose reads take `delay`, honouring the request context.
struct Slow {
    delay: Duration,
}

#[async_trait]
impl CounterStore for Slow {
    async fn get(&self, ctx: &RequestContext) -> anyhow::Result<i64> {
        ctx.bound(tokio::time::sleep(self.delay)).await?;
        Ok(7)
    }

    async fn increment(&self, _: &RequestContext) -> anyhow::Result<()> {
        Ok(())
    }
}

struct Running {
    base: String,
    controller: Arc<stackdemo_server::network::ShutdownController>,
    signal: oneshot::Sender<()>,
    run: JoinHandle<anyhow::Result<()>>,
}

async fn start(delay: Duration, grace: Duration) -> Running {
    let services = Services {
        records: Arc::new(MemoryRecordStore::new()),
        counter: Arc::new(Slow { delay }),
        publisher: Arc::new(MemoryPublisher::new()),
        queue_topic: TopicName::new("ini_testing_docker").unwrap(),
    };
    let mut module = NetworkModule::new(
        NetworkConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            request_timeout: Duration::from_secs(30),
            shutdown_grace: grace,
        },
        services,
    );
    let port = module.start().await.unwrap();
    let controller = module.shutdown_controller();

    let (signal, rx) = oneshot::channel::<()>();
    let run = tokio::spawn(run_until_signal(module, async {
        let _ = rx.await;
    }));

    while controller.state() != LifecycleState::Serving {
        tokio::task::yield_now().await;
    }

    Running {
        base: format!("http://127.0.0.1:{port}"),
        controller,
        signal,
        run,
    }
}

async fn wait_for_in_flight(controller: &stackdemo_server::network::ShutdownController) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while controller.in_flight_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("request never reached the handler");
}

#[tokio::test]
async fn in_flight_request_completes_within_grace() {
    let server = start(Duration::from_millis(300), Duration::from_secs(5)).await;

    let url = format!("{}/api/redis/get", server.base);
    let request = tokio::spawn(async move { reqwest::get(url).await });
    wait_for_in_flight(&server.controller).await;

    server.signal.send(()).unwrap();

    let response = request.await.unwrap().unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"], serde_json::json!({ "Visitor": 7 }));

    server.run.await.unwrap().unwrap();
    assert_eq!(server.controller.state(), LifecycleState::Stopped);
    assert_eq!(server.controller.in_flight_count(), 0);
}

#[tokio::test]
async fn request_outliving_grace_is_cut_off() {
    let server = start(Duration::from_secs(30), Duration::from_millis(200)).await;

    let url = format!("{}/api/redis/get", server.base);
    let request = tokio::spawn(async move { reqwest::get(url).await });
    wait_for_in_flight(&server.controller).await;

    let signalled = tokio::time::Instant::now();
    server.signal.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(5), server.run)
        .await
        .expect("shutdown exceeded the grace period")
        .unwrap()
        .unwrap();
    assert!(signalled.elapsed() < Duration::from_secs(5));
    assert_eq!(server.controller.state(), LifecycleState::Stopped);

    let outcome = tokio::time::timeout(Duration::from_secs(5), request)
        .await
        .expect("client was left hanging")
        .unwrap();
    let err = outcome.expect_err("connection should close without a reply");
    assert!(err.status().is_none(), "{err:?}");
}

#[tokio::test]
async fn listener_closes_after_shutdown() {
    let server = start(Duration::ZERO, Duration::from_secs(1)).await;

    let ping = reqwest::get(format!("{}/ping", server.base)).await.unwrap();
    assert_eq!(ping.text().await.unwrap(), "Hello World !!");

    server.signal.send(()).unwrap();
    server.run.await.unwrap().unwrap();

    assert!(reqwest::get(format!("{}/ping", server.base)).await.is_err());
}
