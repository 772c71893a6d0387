//! Local TCP port probing and allocation.
//!
//! Availability is decided by a connect probe against localhost: a port counts
//! as "in use" iff something accepts the connection. Ports that are reserved
//! but not yet listening are under-detected; that is a documented property of
//! the probe, not something this module tries to paper over.

use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;
use tracing::debug;

/// Connect timeout for a single probe.
const PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// Errors from port allocation.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// Every port in the scan range was in use
    #[error("no free port in range {start}..{end}")]
    Exhausted {
        /// Inclusive start of the scanned range
        start: u16,
        /// Exclusive end of the scanned range
        end: u16,
    },
}

/// Half-open port scan range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    /// Inclusive start
    pub start: u16,
    /// Exclusive end
    pub end: u16,
}

impl PortRange {
    /// Create a new range.
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// True iff `port` falls inside the range.
    pub const fn contains(self, port: u16) -> bool {
        port >= self.start && port < self.end
    }
}

/// Check whether something is already listening on `localhost:port`.
pub fn is_port_in_use(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok()
}

/// Find the first free port in `[start, end)`, scanning ascending.
///
/// # Errors
///
/// Returns [`PortError::Exhausted`] when every port in the range is in use.
pub fn find_available_port(start: u16, end: u16) -> Result<u16, PortError> {
    for port in start..end {
        if !is_port_in_use(port) {
            debug!("Port {} is free", port);
            return Ok(port);
        }
    }
    Err(PortError::Exhausted { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn bind_ephemeral() -> (TcpListener, u16) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn bound_port_is_in_use() {
        let (_listener, port) = bind_ephemeral();
        assert!(is_port_in_use(port));
    }

    #[test]
    fn released_port_is_free() {
        let (listener, port) = bind_ephemeral();
        drop(listener);
        assert!(!is_port_in_use(port));
    }

    #[test]
    fn scan_skips_bound_start() {
        let (_listener, port) = bind_ephemeral();
        let found = find_available_port(port, port.checked_add(20).unwrap()).unwrap();
        assert!(found > port);
        assert!(!is_port_in_use(found));
    }

    #[test]
    fn scan_returns_start_when_free() {
        let (listener, port) = bind_ephemeral();
        drop(listener);
        let found = find_available_port(port, port.checked_add(10).unwrap()).unwrap();
        assert_eq!(found, port);
    }

    #[test]
    fn exhausted_range_is_an_error() {
        let (_listener, port) = bind_ephemeral();
        let err = find_available_port(port, port + 1).unwrap_err();
        assert!(matches!(err, PortError::Exhausted { start, end } if start == port && end == port + 1));
    }

    #[test]
    fn empty_range_is_exhausted() {
        assert!(matches!(
            find_available_port(9000, 9000),
            Err(PortError::Exhausted { .. })
        ));
    }
}
