use crate::base::context::IoResultExt;
use crate::base::poolerror::PoolError;
use crate::socket::client::{Connection, SocketType};
use crate::socket::options::SocketOption;
use crate::socket::transport::TransportKind;
use socket2::Socket;
use std::io;
use std::os::fd::AsRawFd;

/// Opens connections to one endpoint: resolve -> socket -> connect -> setsockopt.
#[derive(Debug, Clone)]
pub struct ConnectJob {
    host: String,
    port: u16,
    kind: TransportKind,
    socket_options: Vec<SocketOption>,
}

impl ConnectJob {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        kind: TransportKind,
        socket_options: Vec<SocketOption>,
    ) -> Self {
        Self { host: host.into(), port, kind, socket_options }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn socket_options(&self) -> &[SocketOption] {
        &self.socket_options
    }

    /// Open one new connection tagged with the current process id.
    pub fn connect(&self) -> Result<Connection, PoolError> {
        let result = self.open();
        match &result {
            Ok(conn) => tracing::debug!(
                id = %conn.id(),
                host = %self.host,
                port = self.port,
                transport = %self.kind,
                "connection established"
            ),
            Err(e) => tracing::debug!(
                host = %self.host,
                port = self.port,
                transport = %self.kind,
                error = %e,
                "connection failed"
            ),
        }
        result
    }

    fn open(&self) -> Result<Connection, PoolError> {
        let (host, port) = (self.host.as_str(), self.port);

        // 1. Address packing
        let addr = self.kind.address(host, port)?;

        // 2. Socket + connect
        let socket = Socket::new(self.kind.domain(), self.kind.socket_type(), None)
            .connection_context(host, port)?;
        socket.connect(&addr).connection_context(host, port)?;

        // 3. Socket options, in configuration order
        for opt in &self.socket_options {
            set_option(&socket, opt).connection_context(host, port)?;
        }

        Ok(Connection::new(self.kind, SocketType::from_socket(self.kind, socket)))
    }
}

fn set_option(socket: &Socket, opt: &SocketOption) -> io::Result<()> {
    let value: libc::c_int = opt.optval;
    // SAFETY: the descriptor is owned by `socket` and `value` outlives the call.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            opt.level,
            opt.optname,
            (&value as *const libc::c_int).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
