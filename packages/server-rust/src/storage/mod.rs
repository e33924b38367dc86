//! Storage adapters behind the [`RecordStore`](crate::traits::RecordStore)
//! and [`CounterStore`](crate::traits::CounterStore) capabilities.
//!
//! - [`PostgresRecordStore`]: payments from `PostgreSQL` via a `sqlx` pool
//! - [`RedisCounterStore`]: the visitor counter in Redis via a `bb8` pool
//! - [`memory`]: in-memory stand-ins for tests and `--in-memory` runs

pub mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod redis;

pub use memory::{MemoryCounterStore, MemoryPublisher, MemoryRecordStore};
#[cfg(feature = "postgres")]
pub use postgres::PostgresRecordStore;
pub use redis::{RedisCounterStore, VISITOR_COUNTER_KEY};
