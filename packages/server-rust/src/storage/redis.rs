//! Redis-backed visitor [`CounterStore`].

use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use bb8_redis::bb8::Pool;
use bb8_redis::redis::AsyncCommands;
use bb8_redis::RedisConnectionManager;

use crate::config::RedisConfig;
use crate::context::RequestContext;
use crate::traits::CounterStore;

/// Key holding today's visitor count.
pub const VISITOR_COUNTER_KEY: &str = "visitor_count_today";

/// Counter stored under a single Redis key, accessed through a `bb8` pool.
#[derive(Clone)]
pub struct RedisCounterStore {
    pool: Pool<RedisConnectionManager>,
    key: String,
}

impl RedisCounterStore {
    /// Builds the pool. Connections are opened lazily on first use and
    /// callers wait for a free connection when `max_active` are busy.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection URL is invalid.
    pub async fn connect(config: &RedisConfig) -> anyhow::Result<Self> {
        let manager = RedisConnectionManager::new(config.url())
            .with_context(|| format!("invalid redis connection {}", config.connection))?;
        let pool = Pool::builder()
            .max_size(config.max_active)
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connection_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build(manager)
            .await
            .context("failed to build redis pool")?;
        Ok(Self::from_pool(pool, VISITOR_COUNTER_KEY))
    }

    #[must_use]
    pub fn from_pool(pool: Pool<RedisConnectionManager>, key: impl Into<String>) -> Self {
        Self {
            pool,
            key: key.into(),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, ctx: &RequestContext) -> anyhow::Result<i64> {
        let count = ctx
            .bound(async {
                let mut conn = self.pool.get().await?;
                let value: Option<i64> = conn.get(self.key.as_str()).await?;
                anyhow::Ok(value)
            })
            .await?
            .context("Failed to get Visitor Count")?;
        Ok(count.unwrap_or(0))
    }

    async fn increment(&self, ctx: &RequestContext) -> anyhow::Result<()> {
        ctx.bound(async {
            let mut conn = self.pool.get().await?;
            let _: i64 = conn.incr(self.key.as_str(), 1).await?;
            anyhow::Ok(())
        })
        .await?
        .context("Failed to increment Visitor Count")
    }
}
