//! Pool configuration.

use crate::base::poolerror::PoolError;
use crate::socket::transport::TransportKind;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// One `setsockopt(level, optname, optval)` call applied to every new connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SocketOption {
    pub level: i32,
    pub optname: i32,
    pub optval: i32,
}

impl SocketOption {
    pub fn new(level: i32, optname: i32, optval: i32) -> Self {
        Self { level, optname, optval }
    }
}

/// Socket pool configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolOptions {
    /// Maximum number of concurrently open connections
    pub size: usize,
    /// How long a checkout may block waiting for a free connection
    #[serde(deserialize_with = "deserialize_secs")]
    pub timeout: Duration,
    /// Open `size` connections when the pool is built
    pub eager: bool,
    /// Transport kind
    #[serde(rename = "type")]
    pub transport: TransportKind,
    /// Socket options, applied in order after connecting
    #[serde(rename = "socketopts")]
    pub socket_options: Vec<SocketOption>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            size: 2,
            timeout: Duration::from_secs(5),
            eager: false,
            transport: TransportKind::Tcp,
            socket_options: Vec::new(),
        }
    }
}

impl PoolOptions {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum pool size.
    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Set the checkout timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the checkout timeout in (fractional) seconds. Negative or NaN means zero.
    pub fn timeout_secs(mut self, secs: f64) -> Self {
        self.timeout = Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO);
        self
    }

    /// Enable or disable eager initialization.
    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    /// Set the transport kind.
    pub fn transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Append a socket option.
    pub fn socket_option(mut self, level: i32, optname: i32, optval: i32) -> Self {
        self.socket_options.push(SocketOption::new(level, optname, optval));
        self
    }

    /// Replace the socket option list.
    pub fn socket_options(mut self, options: Vec<SocketOption>) -> Self {
        self.socket_options = options;
        self
    }

    /// Parse options from JSON, e.g. `{"size": 7, "timeout": 1, "type": "udp"}`.
    #[cfg(feature = "json")]
    pub fn from_json(json: &str) -> Result<Self, PoolError> {
        let options: Self =
            serde_json::from_str(json).map_err(|e| PoolError::InvalidConfig(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.size == 0 {
            return Err(PoolError::InvalidConfig("size must be at least 1".into()));
        }
        Ok(())
    }
}

fn deserialize_secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
