//! `PostgreSQL`-backed [`RecordStore`].

use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Connection, Row};
use stackdemo_core::{Payment, PaymentOrder, PAYMENT_LIMIT};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::context::RequestContext;
use crate::traits::RecordStore;

/// Reads payments through a pooled `sqlx` connection set.
#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    /// Opens the pool and pings the server once.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot connect or the ping fails.
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.conn)
            .await
            .context("DB open connection error")?;

        pool.acquire()
            .await
            .context("DB ping connection error")?
            .ping()
            .await
            .context("DB ping connection error")?;

        info!(max_connections = config.max_connections, "PostgreSQL pool ready");
        Ok(Self::from_pool(pool))
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Builds the listing query. Column and direction come from enumerated
/// values only, so no caller text reaches the SQL.
fn select_payments_sql(order: PaymentOrder) -> String {
    format!(
        "SELECT id::BIGINT AS id, customer_name FROM payments ORDER BY {} {} LIMIT {}",
        order.field.column(),
        order.direction.keyword(),
        PAYMENT_LIMIT
    )
}

fn payment_from_row(row: &PgRow) -> Result<Payment, sqlx::Error> {
    Ok(Payment {
        id: row.try_get("id")?,
        customer_name: row
            .try_get::<Option<String>, _>("customer_name")?
            .unwrap_or_default(),
    })
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn get_all(
        &self,
        ctx: &RequestContext,
        order: PaymentOrder,
    ) -> anyhow::Result<Vec<Payment>> {
        let sql = select_payments_sql(order);
        let rows = ctx
            .bound(sqlx::query(&sql).fetch_all(&self.pool))
            .await?
            .context("Failed to get Payment")?;

        rows.iter()
            .map(payment_from_row)
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to decode Payment")
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
