use std::io;
use std::sync::{Arc, Weak};

use log::{debug, info, warn};

use crate::config::Config;
use crate::event::{EventHandler, Registration};
use crate::handle::Handle;
use crate::ready::Ready;
use crate::sys;

/// Receiver of accepted connections.
pub trait NewConnectionHandler: Send + Sync {
    /// Called on the loop thread with the accepted descriptor; the handler
    /// owns it from here (typically by wrapping it in a server stream
    /// buffer).
    fn handle_new_connection(&self, handle: Handle);
}

/// Accepts connections on a bound address and hands the descriptors to a
/// [`NewConnectionHandler`].
pub struct StreamListener {
    registration: Registration,
    handler: Weak<dyn NewConnectionHandler>,
}

impl StreamListener {
    /// Binds to `ip:port` (IPv4 first, then IPv6) and starts listening with
    /// the configured backlog.
    pub fn create<H>(handler: &Arc<H>, ip: &str, port: u16) -> io::Result<Arc<StreamListener>>
    where
        H: NewConnectionHandler + 'static,
    {
        info!("creating a stream listener ip={} port={}", ip, port);

        let handle = Handle::new_stream_listener(ip, port)?;
        let handler = Arc::downgrade(&(handler.clone() as Arc<dyn NewConnectionHandler>));

        Ok(Arc::new(StreamListener {
            registration: Registration::with_handle(handle),
            handler,
        }))
    }
}

impl EventHandler for StreamListener {
    fn registration(&self) -> &Registration {
        &self.registration
    }

    fn events(&self) -> Ready {
        Ready::read()
    }

    fn handle_events(&self, handle: Handle, events: Ready) {
        if !events.is_read() {
            warn!(
                "received a non-read event for a listener fd={} events={:?}",
                handle, events
            );
            return;
        }

        // Bound the number of accepts per dispatch to avoid starving the
        // loop.
        for _ in 0..Config::global().listen_starvation_limit {
            let new_fd = match sys::socket::accept(handle.raw()) {
                Ok(new_fd) => new_fd,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                    debug!("listener nothing to accept fd={}", handle);
                    return;
                }
                Err(err) => match err.raw_os_error() {
                    Some(
                        libc::EBADF
                        | libc::EFAULT
                        | libc::EINVAL
                        | libc::EMFILE
                        | libc::ENFILE
                        | libc::ENOBUFS
                        | libc::ENOMEM
                        | libc::ENOTSOCK,
                    ) => panic!("accept failed: {}", err),
                    _ => {
                        debug!("listener accept failed fd={} err={}", handle, err);
                        continue;
                    }
                },
            };

            debug!(
                "listener accepted new connection fd={} new_fd={}",
                handle, new_fd
            );

            match self.handler.upgrade() {
                Some(handler) => handler.handle_new_connection(Handle::new(new_fd)),
                None => {
                    warn!("unable to handle new connections - handler has been destroyed");
                    Handle::new(new_fd).close();
                }
            }
        }

        debug!("listener reached starvation limit fd={}", handle);

        if let Some(event) = self.registration.event() {
            event.ready(Ready::read());
        }
    }
}
