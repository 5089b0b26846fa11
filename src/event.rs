use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once, Weak};

use log::{trace, warn};

use crate::event_loop::EventLoop;
use crate::handle::Handle;
use crate::ready::Ready;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// A capability driven by the reactor.
///
/// `handle_events` is invoked on the loop thread with the event's handle and
/// the decoded readiness; `events` reports the interest mask the reactor
/// should register. The embedded [`Registration`] ties the handler to its
/// event once attached.
pub trait EventHandler: Send + Sync {
    fn registration(&self) -> &Registration;

    fn handle_events(&self, handle: Handle, events: Ready);

    fn events(&self) -> Ready {
        Ready::empty()
    }
}

/// A handle returned by the timer factories; `cancel` is idempotent and safe
/// from any thread.
pub trait Cancellable: Send + Sync {
    fn cancel(&self);
}

/// The per-handler attachment slot.
///
/// Holds the handler's stable id, the descriptor it wishes to register (until
/// the loop takes ownership of it) and a weak back-edge to the attached
/// event. Dropping an attached registration closes the event; dropping a
/// never-attached one closes the orphan descriptor.
pub struct Registration {
    id: u64,
    handle: Mutex<Handle>,
    event: Mutex<Weak<Event>>,
    attached: AtomicBool,
}

impl Registration {
    pub fn new() -> Registration {
        Registration::with_handle(Handle::invalid())
    }

    pub fn with_handle(handle: Handle) -> Registration {
        Registration {
            id: next_id(),
            handle: Mutex::new(handle),
            event: Mutex::new(Weak::new()),
            attached: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The attached event, if any.
    pub fn event(&self) -> Option<Arc<Event>> {
        self.event.lock().unwrap().upgrade()
    }

    /// Claims the registration for attachment and surrenders its handle.
    pub(crate) fn begin_attach(&self) -> Handle {
        if self.attached.swap(true, Ordering::AcqRel) {
            panic!("event handler already attached");
        }

        std::mem::replace(&mut *self.handle.lock().unwrap(), Handle::invalid())
    }

    pub(crate) fn set_event(&self, event: &Arc<Event>) {
        *self.event.lock().unwrap() = Arc::downgrade(event);
    }
}

impl Default for Registration {
    fn default() -> Registration {
        Registration::new()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(event) = self.event.lock().unwrap().upgrade() {
            trace!("registration dropped - closing event id={}", event.id());
            event.close();
            return;
        }

        let handle = *self.handle.lock().unwrap();
        if handle.valid() {
            trace!("registration dropped - closing orphan handle fd={}", handle);
            handle.close();
        }
    }
}

/// Mediator between a handler and its loop.
///
/// Strongly owned by the loop's event registry; holds weak references both
/// ways. Owns the handle, which is closed when the event is destroyed.
pub struct Event {
    id: u64,
    handle: Handle,
    event_loop: Weak<EventLoop>,
    handler: Weak<dyn EventHandler>,
    close_once: Once,
}

impl Event {
    pub(crate) fn new(
        event_loop: Weak<EventLoop>,
        handler: Weak<dyn EventHandler>,
        handle: Handle,
    ) -> Event {
        let id = next_id();

        trace!("event is created id={} fd={}", id, handle);

        Event {
            id,
            handle,
            event_loop,
            handler,
            close_once: Once::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub(crate) fn handler(&self) -> Option<Arc<dyn EventHandler>> {
        self.handler.upgrade()
    }

    pub(crate) fn event_loop(&self) -> Option<Arc<EventLoop>> {
        self.event_loop.upgrade()
    }

    /// The handler's current interest mask; empty if the handler is gone.
    pub fn events(&self) -> Ready {
        match self.handler.upgrade() {
            Some(handler) => handler.events(),
            None => Ready::empty(),
        }
    }

    /// Removes the event from its loop. At most once; repeated calls are
    /// no-ops.
    pub fn close(&self) {
        if let Some(event_loop) = self.event_loop.upgrade() {
            self.close_once.call_once(|| event_loop.remove(self.id));
        }
    }

    /// Requests a re-dispatch with `events` once the reactor drains its
    /// pending queues. Safe from any thread.
    pub fn ready(self: &Arc<Self>, events: Ready) {
        match self.event_loop.upgrade() {
            Some(event_loop) => event_loop.ready(self, events),
            None => warn!(
                "event ready called but event loop deleted id={} fd={}",
                self.id, self.handle
            ),
        }
    }

    /// Re-registers the kernel interest set from the handler's current mask.
    /// Loop-thread only.
    pub fn modify(self: &Arc<Self>) {
        match self.event_loop.upgrade() {
            Some(event_loop) => event_loop.modify(self),
            None => warn!(
                "event modify called but event loop deleted id={} fd={}",
                self.id, self.handle
            ),
        }
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        trace!("event is destroyed id={}", self.id);

        if self.handle.valid() {
            self.handle.close();
        }
    }
}
