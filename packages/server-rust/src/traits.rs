use async_trait::async_trait;
use stackdemo_core::{Payment, PaymentOrder, TopicName};

use crate::context::RequestContext;

/// Read access to the payment records.
/// Implementations: `PostgreSQL`, memory (tests and `--in-memory`).
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load up to [`PAYMENT_LIMIT`](stackdemo_core::PAYMENT_LIMIT) payments in the given order.
    async fn get_all(
        &self,
        ctx: &RequestContext,
        order: PaymentOrder,
    ) -> anyhow::Result<Vec<Payment>>;

    /// Release pooled connections. Default is a no-op.
    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A single named counter. `get` and `increment` are independent calls
/// with no transaction spanning them.
/// Implementations: Redis, memory.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the current value. A counter that was never incremented reads as 0.
    async fn get(&self, ctx: &RequestContext) -> anyhow::Result<i64>;

    /// Add one to the counter.
    async fn increment(&self, ctx: &RequestContext) -> anyhow::Result<()>;
}

/// Fire-and-forget message publishing. Only transport errors are reported;
/// delivery is not confirmed.
/// Implementations: nsqd HTTP API, memory.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Serialize `payload` as JSON and publish it to `topic`.
    async fn publish(
        &self,
        ctx: &RequestContext,
        topic: &TopicName,
        payload: &serde_json::Value,
    ) -> anyhow::Result<()>;
}
