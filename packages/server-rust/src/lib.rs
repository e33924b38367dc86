//! `stackdemo` server: enveloped JSON endpoints over `PostgreSQL`, Redis and
//! NSQ, with per-request deadlines and signal-driven graceful shutdown.

pub mod app;
pub mod cli;
pub mod config;
pub mod context;
pub mod logging;
pub mod network;
pub mod queue;
pub mod storage;
pub mod traits;

pub use app::{Application, Services};
pub use context::{ContextError, RequestContext};
pub use traits::{CounterStore, Publisher, RecordStore};
