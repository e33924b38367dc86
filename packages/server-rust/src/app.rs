//! Application wiring: the capability implementations handed to every
//! handler, and the background consumer that runs beside the server.

use std::sync::Arc;

use anyhow::Context as _;
use stackdemo_core::{ChannelName, TopicName};
use tracing::{error, info};

use crate::config::AppConfig;
use crate::queue::{ConsumerConfig, ConsumerManager, NsqPublisher, SimpleProcess};
use crate::storage::{MemoryCounterStore, MemoryPublisher, MemoryRecordStore, RedisCounterStore};
use crate::traits::{CounterStore, Publisher, RecordStore};

/// Capability implementations shared by all handlers. Built once at startup.
#[derive(Clone)]
pub struct Services {
    pub records: Arc<dyn RecordStore>,
    pub counter: Arc<dyn CounterStore>,
    pub publisher: Arc<dyn Publisher>,
    /// Topic `/api/nsq/set` publishes to.
    pub queue_topic: TopicName,
}

impl Services {
    /// Empty in-memory stores and a recording publisher.
    #[must_use]
    pub fn in_memory(queue_topic: TopicName) -> Self {
        Self {
            records: Arc::new(MemoryRecordStore::new()),
            counter: Arc::new(MemoryCounterStore::new()),
            publisher: Arc::new(MemoryPublisher::new()),
            queue_topic,
        }
    }
}

/// Everything the process owns besides the HTTP listener.
pub struct Application {
    services: Services,
    consumer: Option<ConsumerManager>,
}

impl Application {
    /// Connects the production adapters and starts the queue consumer.
    ///
    /// # Errors
    ///
    /// Returns an error if a required config section is missing or any
    /// backend cannot be reached.
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let queue_topic = queue_topic(config)?;

        let records = connect_records(config).await?;
        info!("Connected to database");

        let counter = RedisCounterStore::connect(config.redis()?)
            .await
            .context("failed to connect to redis")?;
        info!("Connected to redis");

        let nsq = config.nsq()?;
        let publisher = NsqPublisher::new(nsq)?;

        let mut consumer = ConsumerManager::new(ConsumerConfig::from_nsq(nsq));
        consumer.register(
            queue_topic.clone(),
            ChannelName::new(&nsq.channel)?,
            SimpleProcess,
        );
        let consumer = start_consumer(consumer).await?;
        info!(topic = %queue_topic, channel = %nsq.channel, "Queue consumer running");

        Ok(Self {
            services: Services {
                records,
                counter: Arc::new(counter),
                publisher: Arc::new(publisher),
                queue_topic,
            },
            consumer: Some(consumer),
        })
    }

    /// In-memory adapters and no consumer. Only `[settings]` is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured topic name is invalid.
    pub fn in_memory(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            services: Services::in_memory(queue_topic(config)?),
            consumer: None,
        })
    }

    #[must_use]
    pub fn services(&self) -> Services {
        self.services.clone()
    }

    /// Stops the consumer and releases pooled connections. Failures are
    /// logged, never returned.
    pub async fn shutdown(mut self) {
        if let Some(consumer) = self.consumer.as_mut() {
            consumer.stop().await;
            info!("Queue consumer stopped");
        }
        if let Err(e) = self.services.records.close().await {
            error!(error = format!("{e:#}"), "failed to close record store");
        }
    }
}

/// Runs every registered subscription. On failure the ones already started
/// are stopped before the error is returned.
async fn start_consumer(mut consumer: ConsumerManager) -> anyhow::Result<ConsumerManager> {
    if let Err(e) = consumer.run().await {
        consumer.stop().await;
        return Err(e);
    }
    Ok(consumer)
}

fn queue_topic(config: &AppConfig) -> anyhow::Result<TopicName> {
    let topic = config.queue_topic();
    TopicName::new(&topic).with_context(|| format!("invalid queue topic {topic:?}"))
}

#[cfg(feature = "postgres")]
async fn connect_records(config: &AppConfig) -> anyhow::Result<Arc<dyn RecordStore>> {
    let store = crate::storage::PostgresRecordStore::connect(config.database()?)
        .await
        .context("failed to connect to database")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn connect_records(_config: &AppConfig) -> anyhow::Result<Arc<dyn RecordStore>> {
    anyhow::bail!("built without the `postgres` feature; run with --in-memory")
}
