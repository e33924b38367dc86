//! Network configuration for the HTTP listener.

use std::time::Duration;

/// Listener and request-handling settings.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Deadline applied to every enveloped request.
    pub request_timeout: Duration,
    /// How long in-flight requests may run after shutdown is triggered.
    pub shutdown_grace: Duration,
}

impl NetworkConfig {
    /// `host:port` string passed to the listener.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            request_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}
