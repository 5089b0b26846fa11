use std::io;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::unix::io::RawFd;

use libc::{c_int, c_void, sockaddr, sockaddr_in, sockaddr_in6, socklen_t};

use log::warn;

/// Parses `ip` as IPv4 first, then IPv6.
pub fn parse_addr(ip: &str, port: u16) -> io::Result<SocketAddr> {
    if let Ok(v4) = ip.parse::<Ipv4Addr>() {
        return Ok(SocketAddr::V4(SocketAddrV4::new(v4, port)));
    }

    if let Ok(v6) = ip.parse::<Ipv6Addr>() {
        return Ok(SocketAddr::V6(SocketAddrV6::new(v6, port, 0, 0)));
    }

    Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        "invalid host - neither an IPv4 nor an IPv6 address",
    ))
}

fn addr_to_raw(addr: &SocketAddr) -> (libc::sockaddr_storage, socklen_t, c_int) {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };

    match addr {
        SocketAddr::V4(v4) => {
            let in4 = sockaddr_in {
                sin_family: libc::AF_INET as libc::sa_family_t,
                sin_port: v4.port().to_be(),
                sin_addr: libc::in_addr {
                    s_addr: u32::from_ne_bytes(v4.ip().octets()),
                },
                sin_zero: [0; 8],
            };

            unsafe {
                std::ptr::write(&mut storage as *mut _ as *mut sockaddr_in, in4);
            }

            (
                storage,
                mem::size_of::<sockaddr_in>() as socklen_t,
                libc::AF_INET,
            )
        }
        SocketAddr::V6(v6) => {
            let in6 = sockaddr_in6 {
                sin6_family: libc::AF_INET6 as libc::sa_family_t,
                sin6_port: v6.port().to_be(),
                sin6_flowinfo: v6.flowinfo(),
                sin6_addr: libc::in6_addr {
                    s6_addr: v6.ip().octets(),
                },
                sin6_scope_id: v6.scope_id(),
            };

            unsafe {
                std::ptr::write(&mut storage as *mut _ as *mut sockaddr_in6, in6);
            }

            (
                storage,
                mem::size_of::<sockaddr_in6>() as socklen_t,
                libc::AF_INET6,
            )
        }
    }
}

fn stream_socket(domain: c_int) -> io::Result<RawFd> {
    syscall!(socket(
        domain,
        libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
        0
    ))
}

/// Creates a bound, listening stream socket.
pub fn listener(addr: &SocketAddr, backlog: c_int) -> io::Result<RawFd> {
    let (raw, len, domain) = addr_to_raw(addr);
    let fd = stream_socket(domain)?;

    let res = syscall!(bind(fd, &raw as *const _ as *const sockaddr, len))
        .and_then(|_| syscall!(listen(fd, backlog)));

    if let Err(err) = res {
        unsafe {
            let _ = libc::close(fd);
        }
        return Err(err);
    }

    Ok(fd)
}

/// Initiates a non-blocking connect. The boolean is true when the connect
/// completed immediately; in-progress and transient failures return a
/// descriptor whose outcome is reported through readiness.
pub fn connect_stream(addr: &SocketAddr) -> io::Result<(RawFd, bool)> {
    let (raw, len, domain) = addr_to_raw(addr);
    let fd = stream_socket(domain)?;

    match syscall!(connect(fd, &raw as *const _ as *const sockaddr, len)) {
        Ok(_) => Ok((fd, true)),
        Err(err) => match err.raw_os_error() {
            Some(libc::EINPROGRESS) => Ok((fd, false)),
            Some(
                libc::EAFNOSUPPORT
                | libc::EALREADY
                | libc::EBADF
                | libc::EFAULT
                | libc::EISCONN
                | libc::ENOTSOCK,
            ) => {
                unsafe {
                    let _ = libc::close(fd);
                }
                Err(err)
            }
            _ => {
                warn!("connect failed fd={} addr={} err={}", fd, addr, err);
                Ok((fd, false))
            }
        },
    }
}

/// Accepts one connection, non-blocking and close-on-exec.
pub fn accept(fd: RawFd) -> io::Result<RawFd> {
    syscall!(accept4(
        fd,
        std::ptr::null_mut(),
        std::ptr::null_mut(),
        libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC
    ))
}

pub fn recv(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let n = syscall!(recv(
        fd,
        buf.as_mut_ptr() as *mut c_void,
        buf.len(),
        libc::MSG_DONTWAIT
    ))?;

    Ok(n as usize)
}

pub fn send(fd: RawFd, buf: &[u8], has_more: bool) -> io::Result<usize> {
    let flags = if has_more { libc::MSG_MORE } else { 0 };

    let n = syscall!(send(
        fd,
        buf.as_ptr() as *const c_void,
        buf.len(),
        flags | libc::MSG_NOSIGNAL | libc::MSG_DONTWAIT
    ))?;

    Ok(n as usize)
}

/// Polls and clears SO_ERROR.
pub fn take_error(fd: RawFd) -> io::Result<Option<io::Error>> {
    let mut error: c_int = 0;
    let mut len = mem::size_of::<c_int>() as socklen_t;

    syscall!(getsockopt(
        fd,
        libc::SOL_SOCKET,
        libc::SO_ERROR,
        &mut error as *mut c_int as *mut c_void,
        &mut len
    ))?;

    if error == 0 {
        Ok(None)
    } else {
        Ok(Some(io::Error::from_raw_os_error(error)))
    }
}

#[cfg(test)]
mod test {
    use super::parse_addr;

    #[test]
    fn parse_v4_then_v6() {
        assert!(parse_addr("127.0.0.1", 80).unwrap().is_ipv4());
        assert!(parse_addr("::1", 80).unwrap().is_ipv6());
        assert!(parse_addr("localhost", 80).is_err());
    }
}
