use std::time::Duration;

/// Configuration for a [`crate::server::ServiceServer`] (§4.1, §6.4).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Prefix used for every metric this server emits.
    pub name: String,
    /// Promises older than this at idle check complete with a timeout
    /// error.
    pub request_timeout: Duration,
    /// Soft limit on the in-flight promise queue. Once the queue reaches
    /// this depth, further requests are still accepted but immediately
    /// rejected with overload.
    pub request_buffer_size: usize,
    /// Whether converted failures are logged (via `tracing::warn!`) as
    /// they're produced.
    pub log_errors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            name: String::new(),
            request_timeout: Duration::from_secs(30),
            request_buffer_size: 100,
            log_errors: true,
        }
    }
}

impl ServerConfig {
    /// A config with the given metric name prefix and otherwise-default
    /// values.
    pub fn new(name: impl Into<String>) -> Self {
        ServerConfig {
            name: name.into(),
            ..ServerConfig::default()
        }
    }
}
