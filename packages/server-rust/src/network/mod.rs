//! HTTP surface: configuration, handlers, middleware, and lifecycle control.

pub mod config;
pub mod connection;
pub mod handlers;
pub mod lifecycle;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::*;
pub use handlers::AppState;
pub use lifecycle::{run_until_signal, shutdown_signal};
pub use module::NetworkModule;
pub use shutdown::*;
