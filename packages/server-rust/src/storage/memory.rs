//! In-memory capability implementations.
//!
//! Each honours the caller's [`RequestContext`] so deadline behaviour can be
//! exercised without external services.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use stackdemo_core::{Payment, PaymentOrder, TopicName, PAYMENT_LIMIT};

use crate::context::RequestContext;
use crate::traits::{CounterStore, Publisher, RecordStore};

/// Payments held in a `Vec`, sorted on every read.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    rows: RwLock<Vec<Payment>>,
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_rows(rows: Vec<Payment>) -> Self {
        Self {
            rows: RwLock::new(rows),
        }
    }

    pub fn insert(&self, payment: Payment) {
        self.rows.write().push(payment);
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_all(
        &self,
        ctx: &RequestContext,
        order: PaymentOrder,
    ) -> anyhow::Result<Vec<Payment>> {
        ctx.check()?;
        let mut rows = self.rows.read().clone();
        rows.sort_by(|a, b| order.compare(a, b));
        rows.truncate(PAYMENT_LIMIT);
        Ok(rows)
    }
}

/// Counter backed by an atomic integer.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    count: AtomicI64,
}

impl MemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn starting_at(count: i64) -> Self {
        Self {
            count: AtomicI64::new(count),
        }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, ctx: &RequestContext) -> anyhow::Result<i64> {
        ctx.check()?;
        Ok(self.count.load(Ordering::Relaxed))
    }

    async fn increment(&self, ctx: &RequestContext) -> anyhow::Result<()> {
        ctx.check()?;
        self.count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Publisher that records payloads per topic instead of sending them.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    published: DashMap<String, Vec<serde_json::Value>>,
}

impl MemoryPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads published to `topic`, oldest first.
    #[must_use]
    pub fn messages(&self, topic: &str) -> Vec<serde_json::Value> {
        self.published
            .get(topic)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(
        &self,
        ctx: &RequestContext,
        topic: &TopicName,
        payload: &serde_json::Value,
    ) -> anyhow::Result<()> {
        ctx.check()?;
        self.published
            .entry(topic.as_str().to_string())
            .or_default()
            .push(payload.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use stackdemo_core::{OrderDirection, OrderField};

    use super::*;
    use crate::context::ContextError;

    fn ctx() -> RequestContext {
        RequestContext::detached("test", Duration::from_secs(5))
    }

    #[tokio::test]
    async fn record_store_sorts_and_limits() {
        let store = MemoryRecordStore::new();
        for id in 0..150 {
            store.insert(Payment {
                id,
                customer_name: format!("customer-{id:03}"),
            });
        }

        let order = PaymentOrder {
            field: OrderField::Id,
            direction: OrderDirection::Desc,
        };
        let rows = store.get_all(&ctx(), order).await.unwrap();
        assert_eq!(rows.len(), PAYMENT_LIMIT);
        assert_eq!(rows[0].id, 149);
        assert_eq!(rows[99].id, 50);
    }

    #[tokio::test]
    async fn record_store_refuses_cancelled_context() {
        let store = MemoryRecordStore::with_rows(Vec::new());
        let ctx = ctx();
        ctx.cancel();
        let err = store.get_all(&ctx, PaymentOrder::default()).await.unwrap_err();
        assert_eq!(err.downcast_ref::<ContextError>(), Some(&ContextError::Cancelled));
    }

    #[tokio::test]
    async fn counter_reads_zero_then_increments() {
        let counter = MemoryCounterStore::new();
        assert_eq!(counter.get(&ctx()).await.unwrap(), 0);
        counter.increment(&ctx()).await.unwrap();
        counter.increment(&ctx()).await.unwrap();
        assert_eq!(counter.get(&ctx()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn publisher_records_per_topic() {
        let publisher = MemoryPublisher::new();
        let topic = TopicName::new("events").unwrap();
        publisher
            .publish(&ctx(), &topic, &serde_json::json!({ "id": "1" }))
            .await
            .unwrap();

        assert_eq!(publisher.messages("events"), vec![serde_json::json!({ "id": "1" })]);
        assert!(publisher.messages("other").is_empty());
    }
}
