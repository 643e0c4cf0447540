//! Ergonomic error context helpers.
//!
//! Provides an extension trait for adding endpoint context to `Result` types,
//! converting IO errors into context-rich `PoolError` variants.

use crate::base::poolerror::PoolError;
use std::io;

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Add connection context to an IO error.
    ///
    /// # Example
    /// ```ignore
    /// use socketpool::base::context::IoResultExt;
    ///
    /// socket.connect(&addr).connection_context("127.0.0.1", 11222)?;
    /// // Error: "Failed to connect to host 127.0.0.1 and port 11222: connection refused"
    /// ```
    fn connection_context(self, host: &str, port: u16) -> Result<T, PoolError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn connection_context(self, host: &str, port: u16) -> Result<T, PoolError> {
        self.map_err(|e| PoolError::connection_failure(host, port, e))
    }
}
