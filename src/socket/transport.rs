//! Transport resolution.
//!
//! Maps a transport kind to the address family and socket type used to open a
//! raw socket, and packs the configured endpoint into a socket address.

use crate::base::context::IoResultExt;
use crate::base::poolerror::PoolError;
use serde::{Deserialize, Deserializer};
use socket2::{Domain, SockAddr, Type};
use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

/// The configured connection family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportKind {
    /// TCP over IPv4.
    #[default]
    Tcp,
    /// TCP over IPv6.
    Tcp6,
    /// UDP over IPv4.
    Udp,
    /// UDP over IPv6.
    Udp6,
    /// UNIX-domain stream socket.
    Unix,
    /// UNIX-domain datagram socket.
    Unigram,
}

impl TransportKind {
    pub const ALL: [TransportKind; 6] = [
        TransportKind::Tcp,
        TransportKind::Tcp6,
        TransportKind::Udp,
        TransportKind::Udp6,
        TransportKind::Unix,
        TransportKind::Unigram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
            TransportKind::Tcp6 => "tcp6",
            TransportKind::Udp => "udp",
            TransportKind::Udp6 => "udp6",
            TransportKind::Unix => "unix",
            TransportKind::Unigram => "unigram",
        }
    }

    /// Address family for `socket(2)`.
    pub fn domain(&self) -> Domain {
        match self {
            TransportKind::Tcp | TransportKind::Udp => Domain::IPV4,
            TransportKind::Tcp6 | TransportKind::Udp6 => Domain::IPV6,
            TransportKind::Unix | TransportKind::Unigram => Domain::UNIX,
        }
    }

    /// Socket type for `socket(2)`.
    pub fn socket_type(&self) -> Type {
        if self.is_stream() {
            Type::STREAM
        } else {
            Type::DGRAM
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, TransportKind::Tcp | TransportKind::Tcp6 | TransportKind::Unix)
    }

    /// True for UNIX-domain transports, whose endpoint is a filesystem path.
    pub fn is_local(&self) -> bool {
        matches!(self, TransportKind::Unix | TransportKind::Unigram)
    }

    /// Pack the endpoint into a socket address.
    ///
    /// Internet transports resolve `host:port` and keep the first address of
    /// the transport's family. Local transports treat `host` as the socket
    /// path and ignore `port`.
    pub fn address(&self, host: &str, port: u16) -> Result<SockAddr, PoolError> {
        if self.is_local() {
            return SockAddr::unix(host).connection_context(host, port);
        }

        let want_v6 = self.domain() == Domain::IPV6;
        let addr = (host, port)
            .to_socket_addrs()
            .connection_context(host, port)?
            .find(|addr: &SocketAddr| addr.is_ipv6() == want_v6)
            .ok_or_else(|| {
                PoolError::connection_failure(
                    host,
                    port,
                    io::Error::new(
                        io::ErrorKind::AddrNotAvailable,
                        format!("no {} address for host", if want_v6 { "IPv6" } else { "IPv4" }),
                    ),
                )
            })?;

        Ok(SockAddr::from(addr))
    }
}

impl FromStr for TransportKind {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_ascii_lowercase();
        TransportKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == label)
            .ok_or_else(|| PoolError::UnknownTransport(s.to_string()))
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TransportKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("tcp".parse::<TransportKind>().unwrap(), TransportKind::Tcp);
        assert_eq!("UDP6".parse::<TransportKind>().unwrap(), TransportKind::Udp6);
        assert_eq!("Unigram".parse::<TransportKind>().unwrap(), TransportKind::Unigram);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = "sctp".parse::<TransportKind>().unwrap_err();
        assert!(matches!(err, PoolError::UnknownTransport(ref s) if s == "sctp"));
    }

    #[test]
    fn test_family_and_type_mapping() {
        let expected = [
            (TransportKind::Tcp, Domain::IPV4, Type::STREAM),
            (TransportKind::Tcp6, Domain::IPV6, Type::STREAM),
            (TransportKind::Udp, Domain::IPV4, Type::DGRAM),
            (TransportKind::Udp6, Domain::IPV6, Type::DGRAM),
            (TransportKind::Unix, Domain::UNIX, Type::STREAM),
            (TransportKind::Unigram, Domain::UNIX, Type::DGRAM),
        ];
        for (kind, domain, ty) in expected {
            assert_eq!(kind.domain(), domain, "{kind}");
            assert_eq!(kind.socket_type(), ty, "{kind}");
        }
    }

    #[test]
    fn test_display_roundtrips_through_parse() {
        for kind in TransportKind::ALL {
            assert_eq!(kind.to_string().parse::<TransportKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_inet_address_packing() {
        let addr = TransportKind::Udp.address("127.0.0.1", 11223).unwrap();
        assert_eq!(addr.as_socket(), Some("127.0.0.1:11223".parse().unwrap()));
    }

    #[test]
    fn test_family_mismatch_is_connection_failure() {
        let err = TransportKind::Tcp6.address("127.0.0.1", 80).unwrap_err();
        assert!(matches!(err, PoolError::ConnectionFailure { port: 80, .. }));
    }

    #[test]
    fn test_path_address_packing() {
        let addr = TransportKind::Unix.address("/tmp/pool.sock", 0).unwrap();
        assert!(addr.is_unix());
        assert_eq!(addr.as_pathname(), Some(std::path::Path::new("/tmp/pool.sock")));
    }
}
