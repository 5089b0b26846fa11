use std::collections::HashMap;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::{Arc, Mutex};

use concurrent_queue::ConcurrentQueue;
use log::{debug, trace};

use crate::event::Event;
use crate::handle::Handle;
use crate::ready::Ready;
use crate::sys;

/// Upper bound on readiness events drained per `process` step.
pub(crate) const MAX_EVENTS: usize = 32;

/// The readiness demultiplexer behind an event loop.
///
/// `add`, `remove` and `ready` may be called from any thread: the request is
/// queued and the wake-up descriptor is signaled, the loop thread finalizes
/// the mutation on its next pass. `modify` and `process` run on the loop
/// thread only. The fd-to-event table is authoritative: requests targeting
/// an event that is no longer current are dropped.
pub(crate) struct Reactor {
    epoll: sys::Epoll,
    waker: sys::EventFd,
    registered: Mutex<HashMap<RawFd, Arc<Event>>>,
    pending_add: ConcurrentQueue<Arc<Event>>,
    pending_remove: ConcurrentQueue<Arc<Event>>,
    pending_ready: ConcurrentQueue<(Arc<Event>, Ready)>,
}

impl Reactor {
    pub fn new() -> io::Result<Reactor> {
        let epoll = sys::Epoll::new()?;
        let waker = sys::EventFd::new()?;

        epoll.add(waker.as_raw_fd(), Ready::read())?;

        trace!(
            "reactor is created epoll_fd={} waker_fd={}",
            epoll.as_raw_fd(),
            waker.as_raw_fd()
        );

        Ok(Reactor {
            epoll,
            waker,
            registered: Mutex::new(HashMap::new()),
            pending_add: ConcurrentQueue::unbounded(),
            pending_remove: ConcurrentQueue::unbounded(),
            pending_ready: ConcurrentQueue::unbounded(),
        })
    }

    pub fn add(&self, event: Arc<Event>) {
        if self.pending_add.push(event).is_err() {
            panic!("reactor add queue closed");
        }
        self.wakeup();
    }

    pub fn remove(&self, event: Arc<Event>) {
        if self.pending_remove.push(event).is_err() {
            panic!("reactor remove queue closed");
        }
        self.wakeup();
    }

    pub fn ready(&self, event: Arc<Event>, events: Ready) {
        if self.pending_ready.push((event, events)).is_err() {
            panic!("reactor ready queue closed");
        }
        self.wakeup();
    }

    /// Re-registers the kernel interest set from the event handler's current
    /// mask. Must run on the loop thread; the caller enforces that.
    pub fn modify(&self, event: &Event) -> io::Result<()> {
        let handle = event.handle();
        let events = event.events();

        trace!(
            "modifying event interest fd={} events={:?} id={}",
            handle,
            events,
            event.id()
        );

        self.epoll.modify(handle.raw(), events)
    }

    pub fn wakeup(&self) {
        match self.waker.write(1) {
            Ok(()) => {}
            // The counter is saturated, the loop is awake regardless.
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) => panic!("reactor wakeup failed: {}", err),
        }
    }

    /// Blocks for readiness, drains one batch and dispatches exactly one
    /// handler call per ready event.
    pub fn process(&self, events: &mut sys::Events) -> io::Result<()> {
        self.epoll.wait(events)?;

        debug!("reactor received {} events", events.len());

        for (fd, ready) in events.iter() {
            if fd == self.waker.as_raw_fd() {
                self.handle_pending()?;
                continue;
            }

            let event = self.registered.lock().unwrap().get(&fd).cloned();

            let event = match event {
                Some(event) => event,
                None => {
                    debug!("descriptor not in the event table - skipping fd={}", fd);
                    continue;
                }
            };

            match event.handler() {
                Some(handler) => {
                    trace!("dispatching fd={} events={:?} id={}", fd, ready, event.id());
                    handler.handle_events(event.handle(), ready);
                }
                None => {
                    trace!("event handler destroyed - skipping fd={} id={}", fd, event.id());
                }
            }
        }

        Ok(())
    }

    fn handle_pending(&self) -> io::Result<()> {
        // Edge-triggered: zero the counter before draining the queues so a
        // racing producer forces another wake-up.
        while self.waker.read().is_ok() {}

        while let Ok(event) = self.pending_add.pop() {
            self.add_finalize(event)?;
        }

        while let Ok(event) = self.pending_remove.pop() {
            self.remove_finalize(event)?;
        }

        while let Ok((event, events)) = self.pending_ready.pop() {
            self.ready_finalize(event, events);
        }

        Ok(())
    }

    fn add_finalize(&self, event: Arc<Event>) -> io::Result<()> {
        let handle = event.handle();

        if !handle.valid() {
            // No descriptor. Invoke the handler once and let it dispose of
            // itself.
            if let Some(handler) = event.handler() {
                trace!("handling an event with no descriptor id={}", event.id());
                handler.handle_events(Handle::invalid(), Ready::empty());
            }
            return Ok(());
        }

        let events = event.events();

        trace!(
            "finalizing add fd={} events={:?} id={}",
            handle,
            events,
            event.id()
        );

        self.registered.lock().unwrap().insert(handle.raw(), event);

        self.epoll.add(handle.raw(), events)
    }

    fn remove_finalize(&self, event: Arc<Event>) -> io::Result<()> {
        let handle = event.handle();

        if !handle.valid() {
            return Ok(());
        }

        trace!("finalizing remove fd={} id={}", handle, event.id());

        let mut registered = self.registered.lock().unwrap();

        match registered.get(&handle.raw()) {
            Some(current) if current.id() == event.id() => {
                registered.remove(&handle.raw());
            }
            Some(_) => {
                // The descriptor was re-registered under a newer event.
                debug!("remove for a superseded event - skipping fd={} id={}", handle, event.id());
                return Ok(());
            }
            None => panic!("event not found fd={} id={}", handle, event.id()),
        }

        drop(registered);

        self.epoll.delete(handle.raw())
    }

    fn ready_finalize(&self, event: Arc<Event>, events: Ready) {
        let handle = event.handle();

        let current = self.registered.lock().unwrap().get(&handle.raw()).cloned();

        match current {
            Some(current) if current.id() == event.id() => {}
            _ => {
                trace!(
                    "ready for an event no longer registered - dropping fd={} id={}",
                    handle,
                    event.id()
                );
                return;
            }
        }

        match event.handler() {
            Some(handler) => handler.handle_events(handle, events),
            None => trace!(
                "ready for a destroyed handler - dropping fd={} id={}",
                handle,
                event.id()
            ),
        }
    }
}
