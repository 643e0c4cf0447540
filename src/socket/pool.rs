use crate::base::poolerror::PoolError;
use crate::socket::client::{Connection, ConnectionId, SocketType};
use crate::socket::connectjob::ConnectJob;
use crate::socket::options::{PoolOptions, SocketOption};
use crate::socket::transport::TransportKind;
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::io::{self, Read, Write};
use std::ops::Deref;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use url::{Host, Url};

/// Upper bound on a single condvar wait, so waiters re-check the pool state
/// even without a checkin.
const WAKE_INTERVAL: Duration = Duration::from_millis(100);

/// Point-in-time view of the pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Live connections, idle or checked out
    pub total: usize,
    /// Connections currently lent out
    pub checked_out: usize,
    /// Connections ready for checkout
    pub idle: usize,
}

struct PoolState {
    /// Every live connection, in creation order.
    all: Vec<Connection>,
    /// Ids of the connections in `all` that are lent out.
    checked_out: HashSet<ConnectionId>,
    closed: bool,
}

impl PoolState {
    fn first_idle(&self) -> Option<usize> {
        self.all.iter().position(|c| !self.checked_out.contains(&c.id()))
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            total: self.all.len(),
            checked_out: self.checked_out.len(),
            idle: self.all.len() - self.checked_out.len(),
        }
    }
}

struct SharedPool {
    job: ConnectJob,
    options: PoolOptions,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl SharedPool {
    fn acquire(&self) -> Result<Connection, PoolError> {
        let start = Instant::now();
        let mut state = self.state.lock();

        loop {
            if state.closed {
                return Err(PoolError::PoolClosed);
            }

            if let Some(conn) = self.try_acquire(&mut state)? {
                tracing::debug!(id = %conn.id(), status = ?state.status(), "connection checked out");
                return Ok(conn);
            }

            // Exhausted: every connection is lent out and the pool is full.
            let elapsed = start.elapsed();
            if elapsed > self.options.timeout {
                tracing::debug!(
                    timeout = ?self.options.timeout,
                    max_size = self.options.size,
                    "checkout timed out"
                );
                return Err(PoolError::ConnectionTimeout {
                    timeout: self.options.timeout,
                    max_size: self.options.size,
                });
            }

            let remaining = self.options.timeout - elapsed;
            self.available.wait_for(&mut state, remaining.min(WAKE_INTERVAL));
        }
    }

    /// One pass of the checkout state machine. `None` means the pool is exhausted.
    fn try_acquire(&self, state: &mut PoolState) -> Result<Option<Connection>, PoolError> {
        if let Some(idx) = state.first_idle() {
            if !state.all[idx].is_stale() {
                let conn = state.all[idx].clone();
                state.checked_out.insert(conn.id());
                return Ok(Some(conn));
            }

            // Created before a fork. Dropping our handle closes the inherited
            // descriptor without shutting down the parent's connection.
            let stale = state.all.remove(idx);
            tracing::debug!(
                id = %stale.id(),
                pid = stale.pid(),
                "discarding connection created by another process"
            );
        }

        if state.all.len() < self.options.size {
            let conn = self.job.connect()?;
            state.checked_out.insert(conn.id());
            state.all.push(conn.clone());
            return Ok(Some(conn));
        }

        Ok(None)
    }

    fn release(&self, conn: &Connection, reset: bool) -> Result<bool, PoolError> {
        let mut state = self.state.lock();

        if state.closed {
            return Err(PoolError::PoolClosed);
        }

        if !state.checked_out.remove(&conn.id()) {
            tracing::debug!(id = %conn.id(), "ignoring checkin of unknown connection");
            return Ok(false);
        }

        if !reset {
            tracing::debug!(id = %conn.id(), "connection checked in");
            self.available.notify_one();
            return Ok(true);
        }

        if let Some(idx) = state.all.iter().position(|c| c.id() == conn.id()) {
            let old = state.all.remove(idx);
            // A stale record shares its socket with the process that created it.
            if !old.is_stale() {
                self.close_connection(&old);
            }
        }

        // The slot is free whether or not the replacement connects.
        self.available.notify_one();

        let replacement = self.job.connect()?;
        tracing::debug!(old = %conn.id(), new = %replacement.id(), "connection reset");
        state.all.push(replacement);
        Ok(true)
    }

    fn warm_up(&self) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        while state.all.len() < self.options.size {
            match self.job.connect() {
                Ok(conn) => state.all.push(conn),
                Err(e) => {
                    for conn in state.all.drain(..) {
                        self.close_connection(&conn);
                    }
                    return Err(e);
                }
            }
        }
        tracing::debug!(count = state.all.len(), "socket pool warmed up");
        Ok(())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }

        for conn in state.all.drain(..) {
            if conn.is_stale() {
                continue;
            }
            self.close_connection(&conn);
        }
        state.checked_out.clear();
        state.closed = true;
        self.available.notify_all();

        tracing::debug!(host = %self.job.host(), port = self.job.port(), "socket pool closed");
    }

    /// Shut the socket down. Failures are logged and ignored.
    fn close_connection(&self, conn: &Connection) {
        if let Err(e) = conn.socket().shutdown() {
            tracing::warn!(
                id = %conn.id(),
                host = %self.job.host(),
                port = self.job.port(),
                error = %e,
                "error closing socket"
            );
        }
    }
}

/// A bounded pool of connections to a single endpoint.
///
/// Cloning is cheap; clones share the same connections.
#[derive(Clone)]
pub struct SocketPool {
    shared: Arc<SharedPool>,
}

impl std::fmt::Debug for SocketPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketPool")
            .field("host", &self.host())
            .field("port", &self.port())
            .field("transport", &self.transport())
            .field("size", &self.size())
            .field("status", &self.status())
            .finish()
    }
}

impl SocketPool {
    /// Build a pool for `host:port` (or the socket path `host` for UNIX transports).
    ///
    /// With `options.eager` set, `options.size` connections are opened before
    /// this returns.
    pub fn new(host: impl Into<String>, port: u16, options: PoolOptions) -> Result<Self, PoolError> {
        options.validate()?;

        let job = ConnectJob::new(host, port, options.transport, options.socket_options.clone());
        let shared = SharedPool {
            job,
            options,
            state: Mutex::new(PoolState {
                all: Vec::new(),
                checked_out: HashSet::new(),
                closed: false,
            }),
            available: Condvar::new(),
        };

        if shared.options.eager {
            shared.warm_up()?;
        }

        Ok(Self { shared: Arc::new(shared) })
    }

    /// Build a pool from an endpoint URL such as `tcp://127.0.0.1:11222`,
    /// `udp6://[::1]:53` or `unix:///run/app.sock`.
    ///
    /// The scheme overrides `options.transport`.
    pub fn from_url(endpoint: &str, options: PoolOptions) -> Result<Self, PoolError> {
        let invalid = |reason: &str| PoolError::InvalidEndpoint(format!("{endpoint}: {reason}"));

        let url = Url::parse(endpoint).map_err(|e| invalid(&e.to_string()))?;
        let transport: TransportKind = url.scheme().parse()?;

        let (host, port) = if transport.is_local() {
            if url.path().is_empty() || url.path() == "/" {
                return Err(invalid("missing socket path"));
            }
            (url.path().to_string(), 0)
        } else {
            let host = match url.host() {
                Some(Host::Domain(d)) if !d.is_empty() => d.to_string(),
                Some(Host::Ipv4(ip)) => ip.to_string(),
                Some(Host::Ipv6(ip)) => ip.to_string(),
                _ => return Err(invalid("missing host")),
            };
            let port = url.port().ok_or_else(|| invalid("missing port"))?;
            (host, port)
        };

        Self::new(host, port, options.transport(transport))
    }

    /// Borrow a connection, opening one if the pool has room.
    ///
    /// Blocks while every connection is lent out and the pool is full. Fails
    /// with [`PoolError::ConnectionTimeout`] once the configured timeout has
    /// elapsed. Waiters are not served in FIFO order.
    ///
    /// The timeout only applies once the pool is exhausted: an idle or newly
    /// opened connection is returned even when the timeout is zero.
    pub fn checkout(&self) -> Result<PooledConnection, PoolError> {
        let conn = self.shared.acquire()?;
        Ok(PooledConnection { conn, pool: Arc::downgrade(&self.shared), returned: false })
    }

    /// [`checkout`](Self::checkout) on tokio's blocking thread pool.
    pub async fn checkout_async(&self) -> Result<PooledConnection, PoolError> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.checkout()).await.map_err(|e| {
            tracing::error!(error = %e, "checkout task failed");
            PoolError::TaskFailed(e.to_string())
        })?
    }

    /// Return a connection to the pool.
    ///
    /// With `reset`, the connection is closed and replaced by a fresh one
    /// before this returns. Returns `Ok(false)` if the connection is not
    /// checked out of this pool.
    pub fn checkin(&self, conn: PooledConnection, reset: bool) -> Result<bool, PoolError> {
        if !std::ptr::eq(conn.pool.as_ptr(), Arc::as_ptr(&self.shared)) {
            return Ok(false);
        }

        let mut conn = conn;
        conn.returned = true;
        self.shared.release(&conn.conn, reset)
    }

    /// Close every connection and refuse further use.
    ///
    /// Connections that are lent out are shut down as well; their holders see
    /// IO errors or EOF from then on.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub fn status(&self) -> PoolStatus {
        self.shared.state.lock().status()
    }

    pub fn connection_count(&self) -> usize {
        self.status().total
    }

    pub fn checked_out_count(&self) -> usize {
        self.status().checked_out
    }

    pub fn idle_count(&self) -> usize {
        self.status().idle
    }

    pub fn host(&self) -> &str {
        self.shared.job.host()
    }

    pub fn port(&self) -> u16 {
        self.shared.job.port()
    }

    /// Maximum number of connections.
    pub fn size(&self) -> usize {
        self.shared.options.size
    }

    pub fn timeout(&self) -> Duration {
        self.shared.options.timeout
    }

    pub fn is_eager(&self) -> bool {
        self.shared.options.eager
    }

    pub fn transport(&self) -> TransportKind {
        self.shared.job.kind()
    }

    pub fn socket_options(&self) -> &[SocketOption] {
        self.shared.job.socket_options()
    }
}

/// A connection borrowed from a [`SocketPool`].
///
/// Dropping it without [`SocketPool::checkin`] returns it to the pool.
#[derive(Debug)]
pub struct PooledConnection {
    conn: Connection,
    pool: Weak<SharedPool>,
    returned: bool,
}

impl PooledConnection {
    pub fn id(&self) -> ConnectionId {
        self.conn.id()
    }

    /// Id of the process that created the underlying connection.
    pub fn pid(&self) -> u32 {
        self.conn.pid()
    }

    pub fn kind(&self) -> TransportKind {
        self.conn.kind()
    }

    pub fn socket(&self) -> &SocketType {
        self.conn.socket()
    }
}

impl Deref for PooledConnection {
    type Target = SocketType;

    fn deref(&self) -> &SocketType {
        self.conn.socket()
    }
}

impl Read for PooledConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.conn.socket().recv(buf)
    }
}

impl Write for PooledConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.conn.socket().send(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.returned {
            return;
        }
        if let Some(shared) = self.pool.upgrade() {
            if let Err(e) = shared.release(&self.conn, false) {
                tracing::debug!(id = %self.conn.id(), error = %e, "implicit checkin failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn test_stale_connection_is_replaced() {
        let (_listener, port) = listener();
        let pool = SocketPool::new("127.0.0.1", port, PoolOptions::new().eager(true).size(1))
            .unwrap();

        let original = pool.shared.state.lock().all[0].id();
        pool.shared.state.lock().all[0].set_pid(0);

        let conn = pool.checkout().unwrap();
        assert_ne!(conn.id(), original);
        assert_eq!(conn.pid(), std::process::id());
        assert_eq!(pool.connection_count(), 1);
        assert_eq!(pool.checked_out_count(), 1);
    }

    #[test]
    fn test_only_fresh_connections_are_reused() {
        let (_listener, port) = listener();
        let pool = SocketPool::new("127.0.0.1", port, PoolOptions::new().eager(true).size(2))
            .unwrap();

        let (stale, fresh) = {
            let mut state = pool.shared.state.lock();
            state.all[0].set_pid(0);
            (state.all[0].id(), state.all[1].id())
        };

        let first = pool.checkout().unwrap();
        let second = pool.checkout().unwrap();
        let ids = [first.id(), second.id()];
        assert!(!ids.contains(&stale));
        assert!(ids.contains(&fresh));
        assert_eq!(pool.connection_count(), 2);
    }

    #[test]
    fn test_zero_timeout_still_serves_idle() {
        let (_listener, port) = listener();
        let pool = SocketPool::new(
            "127.0.0.1",
            port,
            PoolOptions::new().size(1).timeout(Duration::ZERO),
        )
        .unwrap();

        let conn = pool.checkout().unwrap();
        assert!(matches!(pool.checkout(), Err(PoolError::ConnectionTimeout { max_size: 1, .. })));
        pool.checkin(conn, false).unwrap();
        assert!(pool.checkout().is_ok());
    }

    #[test]
    fn test_checkin_into_other_pool_is_ignored() {
        let (_listener, port) = listener();
        let a = SocketPool::new("127.0.0.1", port, PoolOptions::new()).unwrap();
        let b = SocketPool::new("127.0.0.1", port, PoolOptions::new()).unwrap();

        let conn = a.checkout().unwrap();
        assert!(!b.checkin(conn, false).unwrap());
        // The rejected handle went back to its own pool on drop.
        assert_eq!(a.checked_out_count(), 0);
        assert_eq!(a.connection_count(), 1);
    }

    #[test]
    fn test_close_wakes_waiters() {
        let (_listener, port) = listener();
        let pool = SocketPool::new(
            "127.0.0.1",
            port,
            PoolOptions::new().size(1).timeout(Duration::from_secs(30)),
        )
        .unwrap();
        let held = pool.checkout().unwrap();

        let waiter = {
            let pool = pool.clone();
            std::thread::spawn(move || pool.checkout().map(|c| c.id()))
        };
        std::thread::sleep(Duration::from_millis(50));
        pool.close();

        let started = Instant::now();
        assert!(matches!(waiter.join().unwrap(), Err(PoolError::PoolClosed)));
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(held);
    }

    #[test]
    fn test_reset_of_stale_connection_keeps_socket_open() {
        let (listener, port) = listener();
        let pool = SocketPool::new("127.0.0.1", port, PoolOptions::new().size(1)).unwrap();

        let conn = pool.checkout().unwrap();
        let (mut server_side, _) = listener.accept().unwrap();
        let SocketType::Tcp(stream) = conn.socket() else {
            panic!("Expected a TCP socket");
        };
        // Stands in for the descriptor still held by the creating process.
        let mut inherited = stream.try_clone().unwrap();

        let old = conn.id();
        pool.shared.state.lock().all[0].set_pid(0);
        assert!(pool.checkin(conn, true).unwrap());

        inherited.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        server_side.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        assert_eq!(pool.connection_count(), 1);
        assert_ne!(pool.checkout().unwrap().id(), old);
    }

    #[test]
    fn test_drop_after_close_is_quiet() {
        let (_listener, port) = listener();
        let pool = SocketPool::new("127.0.0.1", port, PoolOptions::new()).unwrap();
        let conn = pool.checkout().unwrap();

        pool.close();
        assert!(matches!(pool.shared.release(&conn.conn, false), Err(PoolError::PoolClosed)));
        drop(conn);
        assert_eq!(pool.status(), PoolStatus { total: 0, checked_out: 0, idle: 0 });
    }
}
