use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// Creates a monotonic, non-blocking, close-on-exec timer descriptor and
/// arms it. A zero initial expiration means "fire as soon as possible" and
/// is promoted to the minimum representable delay; `interval` and `value`
/// both zero is a programming error.
///
/// view: <http://man7.org/linux/man-pages/man2/timerfd_create.2.html>
pub fn create(interval: Duration, value: Duration) -> io::Result<RawFd> {
    assert!(
        !(interval.is_zero() && value.is_zero()),
        "invalid timer durations (both zero)"
    );

    let fd = syscall!(timerfd_create(
        libc::CLOCK_MONOTONIC,
        libc::TFD_NONBLOCK | libc::TFD_CLOEXEC
    ))?;

    let mut new_value = libc::itimerspec {
        it_interval: duration_to_timespec(interval),
        it_value: duration_to_timespec(value),
    };

    if new_value.it_value.tv_sec == 0 && new_value.it_value.tv_nsec == 0 {
        // Start as soon as possible.
        new_value.it_value.tv_nsec = 1;
    }

    if let Err(err) = syscall!(timerfd_settime(fd, 0, &new_value, std::ptr::null_mut())) {
        unsafe {
            let _ = libc::close(fd);
        }
        return Err(err);
    }

    Ok(fd)
}

/// Reads the 8-byte expiration counter: the number of times the timer has
/// fired since the last read. `WouldBlock` when the timer has not expired.
pub fn read_expirations(fd: RawFd) -> io::Result<u64> {
    let mut buf = [0u8; 8];

    let n = syscall!(read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()))?;

    debug_assert_eq!(n as usize, buf.len());

    Ok(u64::from_ne_bytes(buf))
}

fn duration_to_timespec(duration: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: duration.subsec_nanos() as libc::c_long,
    }
}
