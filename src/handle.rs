use std::fmt;
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use log::trace;

use crate::config::Config;
use crate::sys;

/// A typed wrapper over a kernel descriptor. A negative value is the
/// "absent" sentinel.
///
/// Dropping a `Handle` does not close the descriptor; closing is explicit
/// and owned by whoever holds the handle last (normally the event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    fd: RawFd,
}

impl Handle {
    pub const fn invalid() -> Handle {
        Handle { fd: -1 }
    }

    pub fn new(fd: RawFd) -> Handle {
        Handle { fd }
    }

    #[inline]
    pub fn valid(&self) -> bool {
        self.fd >= 0
    }

    #[inline]
    pub fn raw(&self) -> RawFd {
        self.fd
    }

    pub fn close(&self) {
        unsafe {
            let _ = libc::close(self.fd);
        }
    }

    /// Creates an armed timer descriptor.
    ///
    /// A zero `value` means "fire as soon as possible"; `interval` and
    /// `value` both zero is a programming error and panics.
    pub fn new_timer(interval: Duration, value: Duration) -> io::Result<Handle> {
        let fd = sys::timerfd::create(interval, value)?;

        trace!(
            "created timer descriptor fd={} interval={:?} value={:?}",
            fd,
            interval,
            value
        );

        Ok(Handle::new(fd))
    }

    /// Creates a bound, listening stream socket. `ip` is parsed as IPv4
    /// first, then IPv6.
    pub fn new_stream_listener(ip: &str, port: u16) -> io::Result<Handle> {
        let addr = sys::socket::parse_addr(ip, port)?;
        let fd = sys::socket::listener(&addr, Config::global().listen_backlog)?;

        trace!("created listener descriptor fd={} ip={} port={}", fd, ip, port);

        Ok(Handle::new(fd))
    }

    /// Initiates a non-blocking connect. The boolean reports whether the
    /// connect completed immediately; when false the outcome is surfaced
    /// through readiness on the returned handle.
    pub fn new_stream(ip: &str, port: u16) -> io::Result<(Handle, bool)> {
        let addr = sys::socket::parse_addr(ip, port)?;
        let (fd, is_connected) = sys::socket::connect_stream(&addr)?;

        trace!(
            "created stream descriptor fd={} ip={} port={} connected={}",
            fd,
            ip,
            port,
            is_connected
        );

        Ok((Handle::new(fd), is_connected))
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.fd)
    }
}

#[cfg(test)]
mod test {
    use super::Handle;

    #[test]
    fn sentinel() {
        assert!(!Handle::invalid().valid());
        assert!(Handle::new(0).valid());
        assert!(!Handle::new(-5).valid());
    }

    #[test]
    fn bad_address_is_an_error() {
        assert!(Handle::new_stream_listener("nonsense", 0).is_err());
        assert!(Handle::new_stream("nonsense", 1).is_err());
    }
}
