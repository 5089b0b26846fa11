use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;
use log::{debug, trace, warn};

use crate::config::Config;
use crate::data_view::DataView;
use crate::event::{EventHandler, Registration};
use crate::handle::Handle;
use crate::ready::Ready;
use crate::stream::filter::{
    close_entry, drive_out, Chain, ConnectResult, FilterEntry, InResult, StreamBufferFilter,
};
use crate::stream::tcp::TcpStreamBufferFilter;

/// Callbacks a stream buffer delivers to its user.
///
/// For every buffer that completes its handshake, `handle_connected`
/// precedes any `handle_data` and the final `handle_eof`; `handle_eof` is
/// delivered exactly once, also when the handshake fails (in which case no
/// `handle_connected` precedes it). All callbacks run on the loop thread.
pub trait StreamBufferHandler: Send + Sync {
    fn handle_data(&self, stream_buffer: &Arc<StreamBuffer>, data: &DataView);

    fn handle_connected(&self, stream_buffer: &Arc<StreamBuffer>);

    fn handle_eof(&self, stream_buffer: &Arc<StreamBuffer>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Client,
    Server,
}

/// A full-duplex byte stream over a socket, with an ordered filter chain
/// between the socket and the user handler.
///
/// `write` and `close` are safe from any thread; everything else - the
/// connection state machine, the filter chain - runs on the loop thread.
pub struct StreamBuffer {
    registration: Registration,
    weak_self: Weak<StreamBuffer>,
    handler: Weak<dyn StreamBufferHandler>,
    mode: Mode,
    filters: Mutex<Vec<FilterEntry>>,
    pending_writes: Mutex<VecDeque<Bytes>>,
    add_filter_allowed: AtomicBool,
    eof_called: AtomicBool,
    should_close: AtomicBool,
}

impl StreamBuffer {
    fn create(
        handler: Weak<dyn StreamBufferHandler>,
        handle: Handle,
        mode: Mode,
        connected_on_create: bool,
    ) -> Arc<StreamBuffer> {
        let stream_buffer = Arc::new_cyclic(|weak_self| StreamBuffer {
            registration: Registration::with_handle(handle),
            weak_self: weak_self.clone(),
            handler,
            mode,
            filters: Mutex::new(Vec::new()),
            pending_writes: Mutex::new(VecDeque::new()),
            add_filter_allowed: AtomicBool::new(true),
            eof_called: AtomicBool::new(false),
            should_close: AtomicBool::new(false),
        });

        trace!("stream buffer created id={}", stream_buffer.registration.id());

        stream_buffer.add_filter(Box::new(TcpStreamBufferFilter::new(
            handle,
            connected_on_create,
        )));

        stream_buffer
    }

    /// A buffer over an already-accepted connection.
    pub fn create_for_server<H>(handler: &Arc<H>, handle: Handle) -> Arc<StreamBuffer>
    where
        H: StreamBufferHandler + 'static,
    {
        StreamBuffer::create(downgrade(handler), handle, Mode::Server, true)
    }

    /// A buffer that connects to `ip:port`. Connect failures after socket
    /// setup are reported asynchronously as an EOF without a preceding
    /// connected callback.
    pub fn create_for_client<H>(
        handler: &Arc<H>,
        ip: &str,
        port: u16,
    ) -> io::Result<Arc<StreamBuffer>>
    where
        H: StreamBufferHandler + 'static,
    {
        let (handle, is_connected) = Handle::new_stream(ip, port)?;

        Ok(StreamBuffer::create(
            downgrade(handler),
            handle,
            Mode::Client,
            is_connected,
        ))
    }

    /// A client buffer over a caller-provided socket; `connected` reports
    /// whether the connect already completed.
    pub fn create_for_client_handle<H>(
        handler: &Arc<H>,
        handle: Handle,
        connected: bool,
    ) -> Arc<StreamBuffer>
    where
        H: StreamBufferHandler + 'static,
    {
        StreamBuffer::create(downgrade(handler), handle, Mode::Client, connected)
    }

    /// Appends `filter` to the outer end of the chain.
    ///
    /// # Panics
    ///
    /// Legal only during construction or inside `handle_connected` for the
    /// just-completed outer filter; panics otherwise.
    pub fn add_filter(&self, filter: Box<dyn StreamBufferFilter>) {
        if !self.add_filter_allowed.swap(false, Ordering::AcqRel) {
            panic!("filter added when it is not allowed");
        }

        let mut filters = self.filters.lock().unwrap();
        let order = filters.len();

        debug!(
            "attaching filter id={} order={}",
            self.registration.id(),
            order
        );

        filters.push(FilterEntry::new(filter, order));
    }

    /// Queues `data` for transmission. Safe from any thread. Zero-length and
    /// post-close writes are refused.
    pub fn write(&self, data: &DataView) {
        if data.is_empty() {
            warn!("trying to write 0 data id={}", self.registration.id());
            return;
        }

        if self.should_close.load(Ordering::Acquire) {
            debug!("should close - cannot write id={}", self.registration.id());
            return;
        }

        debug!("add write {} bytes id={}", data.len(), self.registration.id());

        let saved = data.save();

        let send_write_ready = {
            let mut pending_writes = self.pending_writes.lock().unwrap();
            let was_empty = pending_writes.is_empty();
            pending_writes.push_back(saved);
            was_empty
        };

        if send_write_ready {
            self.ready_event(Ready::write());
        }
    }

    /// Requests a graceful close. Safe from any thread.
    pub fn close(&self) {
        debug!("close invoked id={}", self.registration.id());

        self.should_close.store(true, Ordering::Release);
        self.ready_event(Ready::close());
    }

    fn ready_event(&self, events: Ready) {
        if let Some(event) = self.registration.event() {
            event.ready(events);
        }
    }

    fn is_connected(&self) -> bool {
        self.filters.lock().unwrap().last().map_or(false, |entry| entry.connected)
    }

    fn is_read_closed(&self) -> bool {
        self.filters.lock().unwrap().iter().all(|entry| entry.read_closed)
    }

    fn is_write_closed(&self) -> bool {
        self.filters.lock().unwrap().iter().all(|entry| entry.write_closed)
    }

    /// Read path: drive the outermost filter until it blocks, closes or the
    /// starvation ceiling forces a re-arm.
    fn do_read(&self, this: &Arc<StreamBuffer>, handler: &Arc<dyn StreamBufferHandler>) {
        trace!("read id={}", self.registration.id());

        let mut budget = Config::global().read_starvation_limit;

        let mut filters = self.filters.lock().unwrap();
        let (entry, below) = filters.split_last_mut().expect("empty filter chain");

        if entry.read_closed {
            trace!("filter read closed order={}", entry.order);
            return;
        }

        loop {
            enum Step {
                Closed,
                Blocked,
                Delivered(usize),
            }

            let step = {
                let mut chain = Chain::new(below);

                match entry.filter.in_(&mut chain) {
                    InResult::ShouldClose => Step::Closed,
                    InResult::WouldBlock => Step::Blocked,
                    InResult::Data(view) => {
                        handler.handle_data(this, &view);
                        Step::Delivered(view.len())
                    }
                }
            };

            match step {
                Step::Closed => {
                    entry.read_closed = true;
                    return;
                }
                Step::Blocked => return,
                Step::Delivered(len) => {
                    budget = budget.saturating_sub(len);
                    if budget == 0 {
                        debug!("reached read starvation limit id={}", self.registration.id());
                        self.ready_event(Ready::read());
                        return;
                    }
                }
            }
        }
    }

    /// Write path: snapshot the user queue, hand it to the outermost filter
    /// and flush every lower backlog, outermost first.
    fn do_write(&self) {
        trace!("write id={}", self.registration.id());

        {
            let filters = self.filters.lock().unwrap();
            if filters.last().expect("empty filter chain").write_closed {
                trace!("filter write closed id={}", self.registration.id());
                return;
            }
        }

        let new_views: Vec<Bytes> = {
            let mut pending_writes = self.pending_writes.lock().unwrap();
            pending_writes.drain(..).collect()
        };

        let mut budget = Config::global().write_starvation_limit;
        let mut starved = false;

        {
            let mut filters = self.filters.lock().unwrap();
            let top = filters.len() - 1;
            let mut new_views = Some(new_views);

            for i in (0..=top).rev() {
                let (below, rest) = filters.split_at_mut(i);
                let entry = &mut rest[0];

                let views = if i == top {
                    new_views.take().unwrap_or_default()
                } else {
                    Vec::new()
                };

                if entry.write_closed || (views.is_empty() && entry.pending_out.is_empty()) {
                    continue;
                }

                let _ = drive_out(entry, below, views, &mut budget);

                if budget == 0 {
                    starved = true;
                    break;
                }
            }
        }

        if starved {
            debug!("reached write starvation limit id={}", self.registration.id());
            self.ready_event(Ready::write());
        }
    }

    /// Close path: flush once if every write side is still open, then walk
    /// the chain outermost-in, stopping at the first filter that cannot
    /// close yet.
    fn do_close(&self) {
        trace!("close id={}", self.registration.id());

        let should_flush = self
            .filters
            .lock()
            .unwrap()
            .iter()
            .all(|entry| !entry.write_closed);

        if should_flush {
            trace!("flushing write before close id={}", self.registration.id());
            self.do_write();
        }

        let mut filters = self.filters.lock().unwrap();

        for i in (0..filters.len()).rev() {
            let (below, rest) = filters.split_at_mut(i);
            let entry = &mut rest[0];

            if !entry.is_closed() {
                trace!("calling close on filter order={}", entry.order);
                close_entry(entry, below);
            }

            if !entry.is_closed() {
                trace!(
                    "close on filter - delayed order={} read_closed={} write_closed={}",
                    entry.order,
                    entry.read_closed,
                    entry.write_closed
                );
                break;
            }
        }
    }

    /// Connect path: drive the outermost filter's handshake; success opens
    /// the filter-insertion window around `handle_connected`, re-registers
    /// interest and kicks the next level.
    fn do_connect(&self, this: &Arc<StreamBuffer>, handler: &Arc<dyn StreamBufferHandler>) {
        let verb = match self.mode {
            Mode::Client => "connect",
            Mode::Server => "accept",
        };

        trace!("{} id={}", verb, self.registration.id());

        let result = {
            let mut filters = self.filters.lock().unwrap();
            let (entry, below) = filters.split_last_mut().expect("empty filter chain");
            let mut chain = Chain::new(below);

            match self.mode {
                Mode::Client => entry.filter.connect(&mut chain),
                Mode::Server => entry.filter.accept(&mut chain),
            }
        };

        match result {
            ConnectResult::Failed => {
                debug!("{} failed id={}", verb, self.registration.id());

                let mut filters = self.filters.lock().unwrap();
                let entry = filters.last_mut().expect("empty filter chain");
                entry.read_closed = true;
                entry.write_closed = true;
            }
            ConnectResult::Success => {
                debug!("{} complete id={}", verb, self.registration.id());

                self.filters
                    .lock()
                    .unwrap()
                    .last_mut()
                    .expect("empty filter chain")
                    .connected = true;

                self.add_filter_allowed.store(true, Ordering::Release);
                handler.handle_connected(this);
                self.add_filter_allowed.store(false, Ordering::Release);

                if let Some(event) = self.registration.event() {
                    // A filter pushed during handle_connected changes the
                    // computed interest; re-register and kick the next
                    // handshake level.
                    event.modify();
                    event.ready(Ready::read() | Ready::write());
                }
            }
            ConnectResult::Pending => {
                trace!("{} pending id={}", verb, self.registration.id());
            }
        }
    }

    fn do_finalize(&self, this: &Arc<StreamBuffer>, handler: &Arc<dyn StreamBufferHandler>) {
        trace!("finalize id={}", self.registration.id());

        let outer_read_closed = self
            .filters
            .lock()
            .unwrap()
            .last()
            .expect("empty filter chain")
            .read_closed;

        if !self.should_close.load(Ordering::Acquire) && outer_read_closed {
            trace!("outer filter is read closed id={}", self.registration.id());
            self.should_close.store(true, Ordering::Release);
            self.do_close();
        }

        if self.is_read_closed() && self.is_write_closed() {
            if !self.eof_called.swap(true, Ordering::AcqRel) {
                trace!("EOF id={}", self.registration.id());
                handler.handle_eof(this);

                if let Some(event) = self.registration.event() {
                    event.close();
                }
            }
        }
    }
}

impl EventHandler for StreamBuffer {
    fn registration(&self) -> &Registration {
        &self.registration
    }

    fn events(&self) -> Ready {
        self.filters
            .lock()
            .unwrap()
            .last()
            .map_or_else(Ready::empty, |entry| entry.interest())
    }

    fn handle_events(&self, _handle: Handle, events: Ready) {
        trace!(
            "handling events id={} events={:?}",
            self.registration.id(),
            events
        );

        let this = match self.weak_self.upgrade() {
            Some(this) => this,
            None => return,
        };

        let handler = match self.handler.upgrade() {
            Some(handler) => handler,
            None => {
                warn!(
                    "stream buffer handler has been destroyed - closing id={}",
                    self.registration.id()
                );
                if let Some(event) = self.registration.event() {
                    event.close();
                }
                return;
            }
        };

        if self.should_close.load(Ordering::Acquire) {
            self.do_close();
        } else if !self.is_connected() {
            self.do_connect(&this, &handler);
        } else {
            self.do_read(&this, &handler);
            self.do_write();
        }

        self.do_finalize(&this, &handler);
    }
}

fn downgrade<H>(handler: &Arc<H>) -> Weak<dyn StreamBufferHandler>
where
    H: StreamBufferHandler + 'static,
{
    Arc::downgrade(&(handler.clone() as Arc<dyn StreamBufferHandler>))
}
