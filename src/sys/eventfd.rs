use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

/// Counter-style eventfd used as the reactor wake-up descriptor.
///
/// view: <http://man7.org/linux/man-pages/man2/eventfd.2.html>
#[derive(Debug)]
pub struct EventFd {
    fd: RawFd,
}

impl EventFd {
    pub fn new() -> io::Result<EventFd> {
        let fd = syscall!(eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK))?;

        Ok(EventFd { fd })
    }

    /// Reads and zeroes the counter. `WouldBlock` when the counter is zero.
    pub fn read(&self) -> io::Result<u64> {
        let mut buf = [0u8; 8];

        let n = syscall!(read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()))?;

        debug_assert_eq!(n as usize, buf.len());

        Ok(u64::from_ne_bytes(buf))
    }

    pub fn write(&self, val: u64) -> io::Result<()> {
        let buf: [u8; 8] = val.to_ne_bytes();

        syscall!(write(self.fd, buf.as_ptr() as *const libc::c_void, buf.len()))?;

        Ok(())
    }
}

impl AsRawFd for EventFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for EventFd {
    fn drop(&mut self) {
        unsafe {
            let _ = libc::close(self.fd);
        }
    }
}

#[cfg(test)]
mod test {
    use super::EventFd;

    #[test]
    fn write_and_read() {
        let eventfd = EventFd::new().unwrap();
        eventfd.write(123).unwrap();
        let count = eventfd.read().unwrap();
        assert_eq!(123, count);
    }

    #[test]
    fn read_empty_would_block() {
        let eventfd = EventFd::new().unwrap();
        let err = eventfd.read().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
    }
}
