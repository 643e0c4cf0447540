//! # socketpool
//!
//! A bounded pool of live socket connections to a single endpoint.
//!
//! Concurrent callers borrow a connection, use it, and hand it back. The pool
//! caps how many connections are open at once and how long a caller waits for
//! one. Connections created by another process (after a `fork`) are never
//! handed out; they are discarded and replaced.
//!
//! ## Transports
//!
//! `tcp`, `tcp6`, `udp`, `udp6`, `unix` (stream) and `unigram` (datagram).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use socketpool::{PoolOptions, SocketPool};
//! use std::io::Write;
//!
//! let pool = SocketPool::new("127.0.0.1", 11222, PoolOptions::new().size(4))?;
//!
//! let mut conn = pool.checkout()?;
//! conn.write_all(b"stats\r\n").expect("write");
//! pool.checkin(conn, false)?;
//! # Ok::<(), socketpool::PoolError>(())
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error definitions and IO error context
//! - [`socket`] - Transports, connection factory, options and the pool

pub mod base;
pub mod socket;

pub use base::poolerror::PoolError;
pub use socket::client::{ConnectionId, SocketType};
pub use socket::options::{PoolOptions, SocketOption};
pub use socket::pool::{PoolStatus, PooledConnection, SocketPool};
pub use socket::transport::TransportKind;
