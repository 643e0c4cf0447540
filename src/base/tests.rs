use crate::base::poolerror::PoolError;
use std::io::{Error, ErrorKind};
use std::time::Duration;

#[test]
fn test_connection_failure_message() {
    let err = PoolError::connection_failure(
        "127.0.0.1",
        11222,
        Error::new(ErrorKind::ConnectionRefused, "Connection refused"),
    );
    assert_eq!(
        err.to_string(),
        "Failed to connect to host 127.0.0.1 and port 11222: Connection refused"
    );
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_timeout_message_names_limits() {
    let err = PoolError::ConnectionTimeout { timeout: Duration::from_secs(1), max_size: 7 };
    let msg = err.to_string();
    assert!(msg.contains("within 1 seconds"));
    assert!(msg.contains("currently 7"));
}

#[test]
fn test_transient_classification() {
    let timeout = PoolError::ConnectionTimeout { timeout: Duration::from_millis(500), max_size: 2 };
    assert!(timeout.is_transient());
    assert!(!PoolError::PoolClosed.is_transient());
    assert!(!PoolError::UnknownTransport("sctp".into()).is_transient());
}
