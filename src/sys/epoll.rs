use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

use libc::{EPOLLERR, EPOLLET, EPOLLHUP, EPOLLIN, EPOLLOUT, EPOLLPRI, EPOLLRDHUP};

use crate::ready::Ready;

/// Wrapper over an epoll instance.
///
/// Interest is always registered edge-triggered; handlers must drain until
/// the kernel reports would-block. Events are keyed by the raw descriptor
/// itself, the reactor maps a descriptor back to its event.
pub struct Epoll {
    epfd: RawFd,
}

impl Epoll {
    pub fn new() -> io::Result<Epoll> {
        let epfd = syscall!(epoll_create1(libc::EPOLL_CLOEXEC))?;

        Ok(Epoll { epfd })
    }

    pub fn wait(&self, events: &mut Events) -> io::Result<()> {
        events.events.clear();

        let cnt = syscall!(epoll_wait(
            self.epfd,
            events.events.as_mut_ptr(),
            events.events.capacity() as i32,
            -1
        ))?;

        unsafe { events.events.set_len(cnt as usize) };

        Ok(())
    }

    pub fn add(&self, fd: RawFd, interest: Ready) -> io::Result<()> {
        let mut info = libc::epoll_event {
            events: interest_to_epoll(interest),
            u64: fd as u64,
        };

        syscall!(epoll_ctl(self.epfd, libc::EPOLL_CTL_ADD, fd, &mut info))?;

        Ok(())
    }

    pub fn modify(&self, fd: RawFd, interest: Ready) -> io::Result<()> {
        let mut info = libc::epoll_event {
            events: interest_to_epoll(interest),
            u64: fd as u64,
        };

        syscall!(epoll_ctl(self.epfd, libc::EPOLL_CTL_MOD, fd, &mut info))?;

        Ok(())
    }

    pub fn delete(&self, fd: RawFd) -> io::Result<()> {
        let mut info = libc::epoll_event { events: 0, u64: 0 };

        syscall!(epoll_ctl(self.epfd, libc::EPOLL_CTL_DEL, fd, &mut info))?;

        Ok(())
    }
}

impl AsRawFd for Epoll {
    fn as_raw_fd(&self) -> RawFd {
        self.epfd
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        unsafe {
            let _ = libc::close(self.epfd);
        }
    }
}

fn interest_to_epoll(interest: Ready) -> u32 {
    let mut kind = EPOLLET;

    if interest.is_close() {
        kind |= EPOLLIN | EPOLLOUT | EPOLLRDHUP;
    } else {
        if interest.is_read() {
            kind |= EPOLLIN;
        }

        if interest.is_write() {
            kind |= EPOLLOUT;
        }

        if interest.is_stream() {
            kind |= EPOLLRDHUP;
        }
    }

    kind as u32
}

fn epoll_to_ready(epoll: libc::c_int) -> Ready {
    let mut kind = Ready::empty();

    if (epoll & EPOLLIN) != 0 || (epoll & EPOLLPRI) != 0 {
        kind.insert(Ready::read());
    }

    if (epoll & EPOLLOUT) != 0 {
        kind.insert(Ready::write());
    }

    if (epoll & EPOLLRDHUP) != 0 || (epoll & EPOLLHUP) != 0 {
        kind.insert(Ready::stream());
    }

    // An error condition has to reach the handler so the failing syscall can
    // surface it, report both directions as ready.
    if (epoll & EPOLLERR) != 0 {
        kind.insert(Ready::read() | Ready::write());
    }

    kind
}

pub struct Events {
    events: Vec<libc::epoll_event>,
}

impl Events {
    pub fn with_capacity(u: usize) -> Events {
        Events {
            events: Vec::with_capacity(u),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RawFd, Ready)> + '_ {
        self.events
            .iter()
            .map(|event| (event.u64 as RawFd, epoll_to_ready(event.events as libc::c_int)))
    }
}
