use std::io;

use bytes::Bytes;
use log::{debug, trace};

use crate::data_view::DataView;
use crate::handle::Handle;
use crate::stream::filter::{
    Chain, ConnectResult, InResult, OutResult, ShutdownResult, StreamBufferFilter,
};
use crate::sys;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// The leaf filter: non-blocking reads and writes against the socket
/// itself. Always the innermost filter of a stream buffer; never touches
/// the chain below it.
pub struct TcpStreamBufferFilter {
    handle: Handle,
    connected_on_create: bool,
    read_buf: Box<[u8]>,
}

impl TcpStreamBufferFilter {
    pub(crate) fn new(handle: Handle, connected_on_create: bool) -> TcpStreamBufferFilter {
        trace!("creating a tcp stream buffer filter fd={}", handle);

        TcpStreamBufferFilter {
            handle,
            connected_on_create,
            read_buf: vec![0u8; READ_BUFFER_SIZE].into_boxed_slice(),
        }
    }
}

impl StreamBufferFilter for TcpStreamBufferFilter {
    fn connect(&mut self, _chain: &mut Chain<'_>) -> ConnectResult {
        trace!("connect fd={}", self.handle);

        if self.connected_on_create {
            return ConnectResult::Success;
        }

        // The pending connect resolved to an edge; SO_ERROR tells which way.
        match sys::socket::take_error(self.handle.raw()) {
            Err(err) => panic!("getsockopt failed: {}", err),
            Ok(Some(err)) => {
                debug!("connect failed on socket error fd={} err={}", self.handle, err);
                ConnectResult::Failed
            }
            Ok(None) => {
                debug!("connect complete fd={}", self.handle);
                ConnectResult::Success
            }
        }
    }

    fn accept(&mut self, _chain: &mut Chain<'_>) -> ConnectResult {
        trace!("accept fd={}", self.handle);

        if self.connected_on_create {
            return ConnectResult::Success;
        }

        panic!("unexpected use case - connection should already be accepted");
    }

    fn in_<'a>(&'a mut self, _chain: &mut Chain<'_>) -> InResult<'a> {
        match sys::socket::recv(self.handle.raw(), &mut self.read_buf) {
            Ok(0) => {
                debug!("read EOF fd={}", self.handle);
                InResult::ShouldClose
            }
            Ok(n) => {
                debug!("read {} bytes fd={}", n, self.handle);
                InResult::Data(DataView::new(&self.read_buf[..n]))
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                debug!("read would block fd={}", self.handle);
                InResult::WouldBlock
            }
            Err(err) => match err.raw_os_error() {
                Some(
                    libc::EFAULT | libc::EINVAL | libc::ENOTCONN | libc::ENOTSOCK | libc::EBADF,
                ) => panic!("read failed: {}", err),
                _ => {
                    debug!("read EOF with error fd={} err={}", self.handle, err);
                    InResult::ShouldClose
                }
            },
        }
    }

    fn out(&mut self, view: &mut Option<Bytes>, has_more: bool, _chain: &mut Chain<'_>) -> OutResult {
        let data = match view.take() {
            Some(data) => data,
            None => return OutResult::Continue,
        };

        match sys::socket::send(self.handle.raw(), &data, has_more) {
            Ok(0) => panic!("send returned 0 (kernel bug?)"),
            Ok(n) if n < data.len() => {
                debug!("partial write {} of {} bytes fd={}", n, data.len(), self.handle);
                *view = Some(data.slice(n..));
                OutResult::Continue
            }
            Ok(n) => {
                debug!("write {} bytes fd={}", n, self.handle);
                OutResult::Continue
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                debug!("write would block fd={}", self.handle);
                *view = Some(data);
                OutResult::Continue
            }
            Err(err) => match err.raw_os_error() {
                Some(
                    libc::EBADF
                    | libc::EDESTADDRREQ
                    | libc::EFAULT
                    | libc::EINVAL
                    | libc::EMSGSIZE
                    | libc::ENOMEM
                    | libc::ENOTCONN
                    | libc::ENOTSOCK
                    | libc::EOPNOTSUPP,
                ) => panic!("write failed: {}", err),
                _ => {
                    debug!("no longer writable fd={} err={}", self.handle, err);
                    OutResult::ShouldCloseWrite
                }
            },
        }
    }

    fn shutdown(&mut self, _chain: &mut Chain<'_>) -> ShutdownResult {
        trace!("shutdown fd={}", self.handle);

        // Closing the descriptor itself is the event's job.
        ShutdownResult::Complete
    }
}
