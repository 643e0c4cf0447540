//! Socket and connection management.
//!
//! - [`transport`]: transport kinds, address family/type mapping, address packing
//! - [`client`]: connected sockets and the per-connection record
//! - [`connectjob`]: resolve -> socket -> connect -> setsockopt
//! - [`options`]: pool configuration
//! - [`pool`]: the bounded pool with blocking checkout

pub mod client;
pub mod connectjob;
pub mod options;
pub mod pool;
pub mod transport;
