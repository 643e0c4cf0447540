use crate::socket::transport::TransportKind;
use socket2::{SockRef, Socket};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, UdpSocket};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::net::{UnixDatagram, UnixStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a pooled connection, unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identifier of the process that is running right now.
///
/// Re-read on every call so a forked child sees its own id.
pub fn current_process_id() -> u32 {
    std::process::id()
}

/// A connected socket of any supported transport.
#[derive(Debug)]
pub enum SocketType {
    Tcp(TcpStream),
    Udp(UdpSocket),
    Unix(UnixStream),
    Unigram(UnixDatagram),
}

impl SocketType {
    /// Wrap a connected raw socket in the std type matching `kind`.
    pub fn from_socket(kind: TransportKind, socket: Socket) -> Self {
        match kind {
            TransportKind::Tcp | TransportKind::Tcp6 => SocketType::Tcp(socket.into()),
            TransportKind::Udp | TransportKind::Udp6 => SocketType::Udp(socket.into()),
            TransportKind::Unix => SocketType::Unix(socket.into()),
            TransportKind::Unigram => SocketType::Unigram(socket.into()),
        }
    }

    pub fn send(&self, buf: &[u8]) -> io::Result<usize> {
        match self {
            SocketType::Tcp(s) => (&*s).write(buf),
            SocketType::Udp(s) => s.send(buf),
            SocketType::Unix(s) => (&*s).write(buf),
            SocketType::Unigram(s) => s.send(buf),
        }
    }

    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SocketType::Tcp(s) => (&*s).read(buf),
            SocketType::Udp(s) => s.recv(buf),
            SocketType::Unix(s) => (&*s).read(buf),
            SocketType::Unigram(s) => s.recv(buf),
        }
    }

    /// Shut down both directions. Other handles to the same socket observe EOF
    /// or errors afterwards; the descriptor itself is released on drop.
    pub fn shutdown(&self) -> io::Result<()> {
        SockRef::from(self).shutdown(Shutdown::Both)
    }

    /// Query an integer socket option.
    pub fn get_option(&self, level: i32, name: i32) -> io::Result<i32> {
        let mut value: libc::c_int = 0;
        let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
        // SAFETY: `value` and `len` are valid for writes and sized for a c_int.
        let rc = unsafe {
            libc::getsockopt(
                self.as_raw_fd(),
                level,
                name,
                (&mut value as *mut libc::c_int).cast(),
                &mut len,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(value)
    }
}

impl AsFd for SocketType {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match self {
            SocketType::Tcp(s) => s.as_fd(),
            SocketType::Udp(s) => s.as_fd(),
            SocketType::Unix(s) => s.as_fd(),
            SocketType::Unigram(s) => s.as_fd(),
        }
    }
}

impl AsRawFd for SocketType {
    fn as_raw_fd(&self) -> RawFd {
        self.as_fd().as_raw_fd()
    }
}

impl Read for &SocketType {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv(buf)
    }
}

impl Write for &SocketType {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A live connection as tracked by the pool.
///
/// The pool keeps one handle to every socket it created so that `close` can
/// shut down connections that are currently lent out.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    pid: u32,
    kind: TransportKind,
    socket: Arc<SocketType>,
}

impl Connection {
    pub(crate) fn new(kind: TransportKind, socket: SocketType) -> Self {
        Self { id: ConnectionId::next(), pid: current_process_id(), kind, socket: Arc::new(socket) }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Id of the process that created this connection.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn socket(&self) -> &SocketType {
        &self.socket
    }

    /// True if this connection was created by another process (the pool was forked).
    pub fn is_stale(&self) -> bool {
        self.pid != current_process_id()
    }

    #[cfg(test)]
    pub(crate) fn set_pid(&mut self, pid: u32) {
        self.pid = pid;
    }
}
