use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum PoolError {
    // Connection Errors
    #[error("Failed to connect to host {host} and port {port}: {source}")]
    ConnectionFailure {
        host: String,
        port: u16,
        #[source]
        source: Arc<io::Error>,
    },
    #[error(
        "could not obtain connection within {} seconds. The max pool size is currently {}; \
         consider increasing the pool size or timeout.",
        .timeout.as_secs_f64(),
        .max_size
    )]
    ConnectionTimeout { timeout: Duration, max_size: usize },

    // Configuration Errors
    #[error("Unknown transport type: {0}")]
    UnknownTransport(String),
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    // Lifecycle Errors
    #[error("Socket pool is closed")]
    PoolClosed,
    #[error("Checkout task failed: {0}")]
    TaskFailed(String),
}

impl PoolError {
    /// Build a `ConnectionFailure` for the given endpoint.
    pub fn connection_failure(host: impl Into<String>, port: u16, source: io::Error) -> Self {
        PoolError::ConnectionFailure { host: host.into(), port, source: Arc::new(source) }
    }

    /// Returns true for errors a caller may reasonably retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, PoolError::ConnectionFailure { .. } | PoolError::ConnectionTimeout { .. })
    }
}
