//! Free TCP port discovery.
//!
//! Ports are found by binding a listener on the loopback interface and
//! releasing it immediately. Nothing is reserved: another process may take
//! the port before the container binds it, in which case the container start
//! fails and the user retries.

use std::net::{Ipv4Addr, TcpListener};
use std::ops::RangeInclusive;

use crate::error::ContainerError;

/// Return the first port in `range` that can currently be bound.
///
/// # Errors
///
/// Returns `ContainerError::NoFreePort` when every port in the range is in
/// use (or the range is empty).
pub fn find_free_port(range: RangeInclusive<u16>) -> Result<u16, ContainerError> {
    let (start, end) = (*range.start(), *range.end());

    range
        .into_iter()
        .find(|port| is_port_free(*port))
        .ok_or(ContainerError::NoFreePort { start, end })
}

/// Whether a listener can bind `port` on `127.0.0.1` right now.
#[must_use]
pub fn is_port_free(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn occupied_port() -> (TcpListener, u16) {
        let listener =
            TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("ephemeral bind should succeed");
        let port = listener
            .local_addr()
            .expect("listener should have an address")
            .port();
        (listener, port)
    }

    #[rstest]
    fn occupied_port_is_reported_busy() {
        let (_listener, port) = occupied_port();
        assert!(!is_port_free(port));
    }

    #[rstest]
    fn fully_occupied_range_is_an_error() {
        let (_listener, port) = occupied_port();

        let error = find_free_port(port..=port).expect_err("range should be exhausted");

        assert!(matches!(
            error,
            ContainerError::NoFreePort { start, end } if start == port && end == port
        ));
    }

    #[rstest]
    fn busy_ports_are_skipped() {
        let (listener, port) = occupied_port();
        let next = port.checked_add(1).filter(|candidate| is_port_free(*candidate));
        let Some(expected) = next else {
            // The neighbouring port happens to be taken on this host.
            return;
        };

        let found = find_free_port(port..=expected).expect("a port should be free");
        drop(listener);

        assert_eq!(found, expected);
    }

    #[rstest]
    fn empty_range_is_an_error() {
        let error = find_free_port(RangeInclusive::new(10, 9)).expect_err("empty range has no ports");
        assert!(matches!(error, ContainerError::NoFreePort { start: 10, end: 9 }));
    }
}
