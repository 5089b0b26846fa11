use std::collections::VecDeque;

use bytes::Bytes;
use log::trace;

use crate::data_view::DataView;
use crate::ready::Ready;

/// One inbound step.
pub enum InResult<'a> {
    /// The read side is finished; the driver marks the filter read-closed.
    ShouldClose,
    /// Nothing available right now.
    WouldBlock,
    /// One chunk of inbound data. Borrowed views die with the call; use
    /// [`DataView::save`] to keep the bytes.
    Data(DataView<'a>),
}

/// One outbound step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutResult {
    Continue,
    /// The write side is finished; the driver marks the filter write-closed.
    ShouldCloseWrite,
}

/// Outcome of a handshake step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectResult {
    Pending,
    Failed,
    Success,
}

/// Outcome of a graceful-close step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    Pending,
}

/// A bidirectional byte-transforming segment of the stream pipeline.
///
/// Filters form an ordered chain owned by the stream buffer: index 0 is the
/// innermost filter (the TCP leaf talking to the socket), the last is the
/// outermost, facing the user handler. Inbound bytes flow back-to-front,
/// outbound bytes front-to-back. Every callback receives a [`Chain`] over
/// the filters below it; the innermost filter's chain is empty.
///
/// All methods run on the loop thread.
pub trait StreamBufferFilter: Send {
    /// Drives the client-side handshake; called until it stops returning
    /// [`ConnectResult::Pending`].
    fn connect(&mut self, chain: &mut Chain<'_>) -> ConnectResult;

    /// Drives the server-side handshake.
    fn accept(&mut self, chain: &mut Chain<'_>) -> ConnectResult;

    /// Produces one chunk of inbound data, typically by pulling ciphertext
    /// or raw bytes from the filter below via [`Chain::prev_in`].
    fn in_<'a>(&'a mut self, chain: &mut Chain<'_>) -> InResult<'a>;

    /// Consumes one outbound view, pushing transformed bytes toward the
    /// socket via [`Chain::prev_out`]. Leave a suffix in `view` for partial
    /// progress, or the whole view for none; take it when fully consumed.
    /// `has_more` hints that more queued data follows immediately.
    fn out(&mut self, view: &mut Option<Bytes>, has_more: bool, chain: &mut Chain<'_>) -> OutResult;

    /// One step of the graceful-close exchange; called until it reports
    /// [`ShutdownResult::Complete`].
    fn shutdown(&mut self, chain: &mut Chain<'_>) -> ShutdownResult;
}

/// Chain state the buffer keeps per filter.
pub(crate) struct FilterEntry {
    pub(crate) filter: Box<dyn StreamBufferFilter>,
    pub(crate) order: usize,
    pub(crate) connected: bool,
    pub(crate) read_closed: bool,
    pub(crate) write_closed: bool,
    pub(crate) pending_out: VecDeque<Bytes>,
}

impl FilterEntry {
    pub(crate) fn new(filter: Box<dyn StreamBufferFilter>, order: usize) -> FilterEntry {
        FilterEntry {
            filter,
            order,
            connected: false,
            read_closed: false,
            write_closed: false,
            pending_out: VecDeque::new(),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.read_closed && self.write_closed
    }

    /// Inner filters always keep read interest so a handshake can make
    /// progress before the outermost filter reports connected.
    pub(crate) fn interest(&self) -> Ready {
        if self.connected || self.order > 0 {
            Ready::read() | Ready::write() | Ready::stream()
        } else {
            Ready::write() | Ready::stream()
        }
    }
}

/// The filters below the one currently being driven.
pub struct Chain<'a> {
    below: &'a mut [FilterEntry],
}

impl<'a> Chain<'a> {
    pub(crate) fn new(below: &'a mut [FilterEntry]) -> Chain<'a> {
        Chain { below }
    }

    /// True when the callee is the innermost filter.
    pub fn is_innermost(&self) -> bool {
        self.below.is_empty()
    }

    /// One inbound step on the filter below. Data crossing filters is
    /// always saved to an owned view.
    ///
    /// # Panics
    ///
    /// Panics when called from the innermost filter.
    pub fn prev_in(&mut self) -> InResult<'static> {
        let (entry, below) = self
            .below
            .split_last_mut()
            .expect("no previous filter in the chain");

        let mut chain = Chain::new(below);

        match entry.filter.in_(&mut chain) {
            InResult::ShouldClose => InResult::ShouldClose,
            InResult::WouldBlock => InResult::WouldBlock,
            InResult::Data(view) => InResult::Data(DataView::from_bytes(view.save())),
        }
    }

    /// Hands `views` to the filter below and drives its write side. Bytes
    /// that cannot move yet stay in that filter's pending-out queue.
    ///
    /// # Panics
    ///
    /// Panics when called from the innermost filter.
    pub fn prev_out(&mut self, views: Vec<Bytes>) -> OutResult {
        let (entry, below) = self
            .below
            .split_last_mut()
            .expect("no previous filter in the chain");

        let mut unlimited = usize::MAX;

        drive_out(entry, below, views, &mut unlimited)
    }
}

/// The shared write driver: queue the new views, then pop and feed the
/// filter one view at a time. A view left in the slot means no further
/// progress is possible this round.
pub(crate) fn drive_out(
    entry: &mut FilterEntry,
    below: &mut [FilterEntry],
    views: Vec<Bytes>,
    budget: &mut usize,
) -> OutResult {
    entry.pending_out.extend(views);

    if entry.write_closed {
        return OutResult::ShouldCloseWrite;
    }

    while let Some(view) = entry.pending_out.pop_front() {
        let len = view.len();
        let has_more = !entry.pending_out.is_empty();
        let mut slot = Some(view);

        let result = entry.filter.out(&mut slot, has_more, &mut Chain::new(below));

        if let OutResult::ShouldCloseWrite = result {
            entry.write_closed = true;
            return result;
        }

        match slot {
            Some(rest) => {
                *budget = budget.saturating_sub(len - rest.len());
                entry.pending_out.push_front(rest);
                return OutResult::Continue;
            }
            None => {
                *budget = budget.saturating_sub(len);
                if *budget == 0 {
                    return OutResult::Continue;
                }
            }
        }
    }

    OutResult::Continue
}

/// The shared close driver: flush what is pending, then attempt the
/// shutdown exchange. Completion closes both sides of the filter.
pub(crate) fn close_entry(entry: &mut FilterEntry, below: &mut [FilterEntry]) {
    if !entry.pending_out.is_empty() && !entry.write_closed {
        trace!("flushing pending out data before close order={}", entry.order);

        let mut unlimited = usize::MAX;
        let _ = drive_out(entry, below, Vec::new(), &mut unlimited);
    }

    if entry.pending_out.is_empty() || entry.write_closed {
        if let ShutdownResult::Complete = entry.filter.shutdown(&mut Chain::new(below)) {
            trace!("shutdown is complete order={}", entry.order);
            entry.write_closed = true;
            entry.read_closed = true;
        }
        return;
    }

    trace!(
        "cannot close - more data to flush out order={} pending={}",
        entry.order,
        entry.pending_out.len()
    );
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Accepts at most `accept` bytes per out call; zero blocks entirely.
    struct SinkFilter {
        accept: usize,
        taken: Arc<Mutex<Vec<u8>>>,
        close_write: bool,
    }

    impl StreamBufferFilter for SinkFilter {
        fn connect(&mut self, _chain: &mut Chain<'_>) -> ConnectResult {
            ConnectResult::Success
        }

        fn accept(&mut self, _chain: &mut Chain<'_>) -> ConnectResult {
            ConnectResult::Success
        }

        fn in_<'a>(&'a mut self, _chain: &mut Chain<'_>) -> InResult<'a> {
            InResult::WouldBlock
        }

        fn out(
            &mut self,
            view: &mut Option<Bytes>,
            _has_more: bool,
            _chain: &mut Chain<'_>,
        ) -> OutResult {
            if self.close_write {
                return OutResult::ShouldCloseWrite;
            }

            let data = match view.take() {
                Some(data) => data,
                None => return OutResult::Continue,
            };

            if self.accept == 0 {
                *view = Some(data);
                return OutResult::Continue;
            }

            let n = self.accept.min(data.len());
            self.taken.lock().unwrap().extend_from_slice(&data[..n]);

            if n < data.len() {
                *view = Some(data.slice(n..));
            }

            OutResult::Continue
        }

        fn shutdown(&mut self, _chain: &mut Chain<'_>) -> ShutdownResult {
            ShutdownResult::Complete
        }
    }

    fn sink(accept: usize) -> (FilterEntry, Arc<Mutex<Vec<u8>>>) {
        let taken = Arc::new(Mutex::new(Vec::new()));
        let entry = FilterEntry::new(
            Box::new(SinkFilter {
                accept,
                taken: taken.clone(),
                close_write: false,
            }),
            0,
        );
        (entry, taken)
    }

    #[test]
    fn drive_out_requeues_partial_progress() {
        let (mut entry, taken) = sink(3);
        let mut below = Vec::new();
        let mut budget = usize::MAX;

        let result = drive_out(
            &mut entry,
            &mut below,
            vec![Bytes::from_static(b"abcdefgh")],
            &mut budget,
        );

        assert_eq!(result, OutResult::Continue);
        assert_eq!(taken.lock().unwrap().as_slice(), b"abc");
        assert_eq!(entry.pending_out.len(), 1);
        assert_eq!(&entry.pending_out[0][..], b"defgh");

        // Subsequent rounds drain the remainder in order.
        let mut budget = usize::MAX;
        let _ = drive_out(&mut entry, &mut below, Vec::new(), &mut budget);
        let mut budget = usize::MAX;
        let _ = drive_out(&mut entry, &mut below, Vec::new(), &mut budget);
        let mut budget = usize::MAX;
        let _ = drive_out(&mut entry, &mut below, Vec::new(), &mut budget);

        assert_eq!(taken.lock().unwrap().as_slice(), b"abcdefgh");
        assert!(entry.pending_out.is_empty());
    }

    #[test]
    fn drive_out_keeps_a_blocked_view_queued() {
        let (mut entry, taken) = sink(0);
        let mut below = Vec::new();
        let mut budget = usize::MAX;

        let result = drive_out(
            &mut entry,
            &mut below,
            vec![Bytes::from_static(b"stuck")],
            &mut budget,
        );

        assert_eq!(result, OutResult::Continue);
        assert!(taken.lock().unwrap().is_empty());
        assert_eq!(entry.pending_out.len(), 1);
        assert!(!entry.write_closed);
    }

    #[test]
    fn drive_out_stops_at_the_byte_budget() {
        let (mut entry, taken) = sink(usize::MAX);
        let mut below = Vec::new();
        let mut budget = 4;

        let result = drive_out(
            &mut entry,
            &mut below,
            vec![Bytes::from_static(b"four"), Bytes::from_static(b"more")],
            &mut budget,
        );

        assert_eq!(result, OutResult::Continue);
        assert_eq!(budget, 0);
        assert_eq!(taken.lock().unwrap().as_slice(), b"four");
        assert_eq!(entry.pending_out.len(), 1);
    }

    #[test]
    fn drive_out_marks_the_write_side_closed() {
        let taken = Arc::new(Mutex::new(Vec::new()));
        let mut entry = FilterEntry::new(
            Box::new(SinkFilter {
                accept: 1,
                taken,
                close_write: true,
            }),
            0,
        );
        let mut below = Vec::new();
        let mut budget = usize::MAX;

        let result = drive_out(
            &mut entry,
            &mut below,
            vec![Bytes::from_static(b"x")],
            &mut budget,
        );

        assert_eq!(result, OutResult::ShouldCloseWrite);
        assert!(entry.write_closed);
    }

    #[test]
    fn close_entry_completes_when_nothing_is_pending() {
        let (mut entry, _taken) = sink(usize::MAX);
        let mut below = Vec::new();

        close_entry(&mut entry, &mut below);

        assert!(entry.read_closed);
        assert!(entry.write_closed);
    }

    #[test]
    fn close_entry_flushes_before_shutting_down() {
        let (mut entry, taken) = sink(usize::MAX);
        entry.pending_out.push_back(Bytes::from_static(b"tail"));
        let mut below = Vec::new();

        close_entry(&mut entry, &mut below);

        assert_eq!(taken.lock().unwrap().as_slice(), b"tail");
        assert!(entry.is_closed());
    }

    #[test]
    fn interest_follows_connection_state() {
        let (mut entry, _taken) = sink(1);

        assert_eq!(entry.interest(), Ready::write() | Ready::stream());

        entry.connected = true;
        assert_eq!(
            entry.interest(),
            Ready::read() | Ready::write() | Ready::stream()
        );

        let (mut inner, _taken) = sink(1);
        inner.order = 1;
        assert_eq!(
            inner.interest(),
            Ready::read() | Ready::write() | Ready::stream()
        );
    }
}
