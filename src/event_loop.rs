use std::collections::HashMap;
use std::io;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use indexmap::IndexMap;
use log::{debug, trace, warn};

use crate::config::Config;
use crate::event::{Cancellable, Event, EventHandler, Registration};
use crate::handle::Handle;
use crate::reactor::{Reactor, MAX_EVENTS};
use crate::ready::Ready;
use crate::sys;

static TABLE: Mutex<Vec<Arc<EventLoop>>> = Mutex::new(Vec::new());

/// A reactor plus the dedicated thread that drives it.
///
/// All handler callbacks run on that thread; attachment and the execute
/// variants are safe from any thread. Loops are registered in a process-wide
/// table so [`EventLoop::destroy_all`] can wind every one of them down.
pub struct EventLoop {
    reactor: Reactor,
    events: Mutex<IndexMap<u64, Arc<Event>>>,
    internal: Mutex<HashMap<u64, Arc<dyn EventHandler>>>,
    stop: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: OnceLock<ThreadId>,
}

impl EventLoop {
    /// Allocates a loop, registers it in the process-wide table and starts
    /// its thread.
    pub fn create() -> io::Result<Arc<EventLoop>> {
        let event_loop = Arc::new(EventLoop {
            reactor: Reactor::new()?,
            events: Mutex::new(IndexMap::new()),
            internal: Mutex::new(HashMap::new()),
            stop: AtomicBool::new(false),
            thread: Mutex::new(None),
            thread_id: OnceLock::new(),
        });

        TABLE.lock().unwrap().push(event_loop.clone());

        trace!("event loop is being created - starting thread");

        let run_loop = event_loop.clone();
        let thread = thread::Builder::new()
            .name("ael-event-loop".into())
            .spawn(move || run_loop.run())?;

        *event_loop.thread.lock().unwrap() = Some(thread);

        Ok(event_loop)
    }

    /// Stops every loop in the process and joins their threads.
    pub fn destroy_all() {
        let table = mem::take(&mut *TABLE.lock().unwrap());

        for event_loop in table {
            event_loop.stop();
        }
    }

    /// Wraps `handler` in an event and hands it to the reactor.
    ///
    /// # Panics
    ///
    /// Panics if the handler is already attached.
    pub fn attach<H>(self: &Arc<Self>, handler: &Arc<H>)
    where
        H: EventHandler + 'static,
    {
        self.attach_handler(handler.clone() as Arc<dyn EventHandler>)
    }

    /// Runs `f` once on the loop thread. Skipped if `instance` has been
    /// dropped by then.
    pub fn execute_once<T, F>(self: &Arc<Self>, f: F, instance: &Arc<T>)
    where
        T: Send + Sync + 'static,
        F: Fn(&Arc<T>) + Send + Sync + 'static,
    {
        let handler = Arc::new(ExecuteHandler {
            registration: Registration::new(),
            func: thunk(f, instance),
        });

        self.attach_internal(handler);
    }

    /// Runs `f` once after `execute_in`.
    pub fn execute_once_in<T, F>(
        self: &Arc<Self>,
        execute_in: Duration,
        f: F,
        instance: &Arc<T>,
    ) -> io::Result<Arc<dyn Cancellable>>
    where
        T: Send + Sync + 'static,
        F: Fn(&Arc<T>) + Send + Sync + 'static,
    {
        self.execute_timer(Duration::ZERO, execute_in, thunk(f, instance))
    }

    /// Runs `f` every `interval`, starting as soon as possible.
    pub fn execute_interval<T, F>(
        self: &Arc<Self>,
        interval: Duration,
        f: F,
        instance: &Arc<T>,
    ) -> io::Result<Arc<dyn Cancellable>>
    where
        T: Send + Sync + 'static,
        F: Fn(&Arc<T>) + Send + Sync + 'static,
    {
        self.execute_timer(interval, Duration::ZERO, thunk(f, instance))
    }

    /// Runs `f` every `interval`, starting after `execute_in`.
    pub fn execute_interval_in<T, F>(
        self: &Arc<Self>,
        interval: Duration,
        execute_in: Duration,
        f: F,
        instance: &Arc<T>,
    ) -> io::Result<Arc<dyn Cancellable>>
    where
        T: Send + Sync + 'static,
        F: Fn(&Arc<T>) + Send + Sync + 'static,
    {
        self.execute_timer(interval, execute_in, thunk(f, instance))
    }

    fn execute_timer(
        self: &Arc<Self>,
        interval: Duration,
        execute_in: Duration,
        func: Thunk,
    ) -> io::Result<Arc<dyn Cancellable>> {
        let handler = TimerHandler::create(interval, execute_in, func)?;

        self.attach_internal(handler.clone());

        Ok(handler)
    }

    fn attach_handler(self: &Arc<Self>, handler: Arc<dyn EventHandler>) {
        let handle = handler.registration().begin_attach();

        let event = Arc::new(Event::new(
            Arc::downgrade(self),
            Arc::downgrade(&handler),
            handle,
        ));

        handler.registration().set_event(&event);

        debug!(
            "event handler attaching to event loop event_id={} fd={}",
            event.id(),
            event.handle()
        );

        self.events.lock().unwrap().insert(event.id(), event.clone());

        self.reactor.add(event);
    }

    fn attach_internal(self: &Arc<Self>, handler: Arc<dyn EventHandler>) {
        self.internal
            .lock()
            .unwrap()
            .insert(handler.registration().id(), handler.clone());

        self.attach_handler(handler);
    }

    pub(crate) fn remove_internal(&self, id: u64) {
        self.internal.lock().unwrap().remove(&id);
    }

    /// Removes the event from the registry and unregisters it from the
    /// reactor. Reached through `Event::close`, which gates repetition.
    pub(crate) fn remove(&self, id: u64) {
        debug!("removing event id={}", id);

        let event = self
            .events
            .lock()
            .unwrap()
            .swap_remove(&id)
            .expect("event not found");

        self.reactor.remove(event);
    }

    pub(crate) fn ready(&self, event: &Arc<Event>, events: Ready) {
        trace!("readying an event id={} events={:?}", event.id(), events);

        self.reactor.ready(event.clone(), events);
    }

    pub(crate) fn modify(&self, event: &Arc<Event>) {
        if self.thread_id.get() != Some(&thread::current().id()) {
            panic!("modify called outside the scope of the event loop");
        }

        self.reactor
            .modify(event)
            .expect("failed to modify the kernel interest set");
    }

    pub(crate) fn stop(&self) {
        debug!("event loop is stopping");

        self.stop.store(true, Ordering::Release);
        self.reactor.wakeup();

        let thread = self.thread.lock().unwrap().take();
        if let Some(thread) = thread {
            let _ = thread.join();
        }

        debug!("event loop stopped");
    }

    fn run(&self) {
        let _ = self.thread_id.set(thread::current().id());

        debug!("event loop thread started");

        let mut events = sys::Events::with_capacity(MAX_EVENTS);

        while !self.stop.load(Ordering::Acquire) {
            self.reactor
                .process(&mut events)
                .expect("event loop processing failed");
        }

        debug!("event loop stop detected");

        // Snapshot to keep `Event::close` from mutating the registry under
        // our iteration.
        let events_to_close: Vec<Arc<Event>> =
            self.events.lock().unwrap().values().cloned().collect();

        for event in events_to_close {
            event.close();
        }

        // Wakeup again in case there is nothing left to process.
        self.reactor.wakeup();

        self.reactor
            .process(&mut events)
            .expect("event loop processing failed");

        self.internal.lock().unwrap().clear();

        debug!("event loop thread finished");
    }
}

type Thunk = Box<dyn Fn() -> bool + Send + Sync>;

/// Wraps `f` and a weak owner: the call reports false when the owner is
/// gone.
fn thunk<T, F>(f: F, instance: &Arc<T>) -> Thunk
where
    T: Send + Sync + 'static,
    F: Fn(&Arc<T>) + Send + Sync + 'static,
{
    let instance = Arc::downgrade(instance);

    Box::new(move || match instance.upgrade() {
        Some(instance) => {
            f(&instance);
            true
        }
        None => false,
    })
}

/// One-shot handler with no descriptor; the reactor's no-handle path invokes
/// it once and it disposes of itself.
struct ExecuteHandler {
    registration: Registration,
    func: Thunk,
}

impl EventHandler for ExecuteHandler {
    fn registration(&self) -> &Registration {
        &self.registration
    }

    fn handle_events(&self, _handle: Handle, _events: Ready) {
        let _ = (self.func)();

        if let Some(event) = self.registration.event() {
            let event_loop = event.event_loop();

            event.close();

            if let Some(event_loop) = event_loop {
                event_loop.remove_internal(self.registration.id());
            }
        }
    }
}

struct TimerHandler {
    registration: Registration,
    run_once: bool,
    func: Thunk,
    canceled: AtomicBool,
}

impl TimerHandler {
    fn create(interval: Duration, execute_in: Duration, func: Thunk) -> io::Result<Arc<TimerHandler>> {
        let handle = Handle::new_timer(interval, execute_in)?;

        trace!(
            "timer handler created interval={:?} execute_in={:?} fd={}",
            interval,
            execute_in,
            handle
        );

        Ok(Arc::new(TimerHandler {
            registration: Registration::with_handle(handle),
            run_once: interval.is_zero(),
            func,
            canceled: AtomicBool::new(false),
        }))
    }
}

impl EventHandler for TimerHandler {
    fn registration(&self) -> &Registration {
        &self.registration
    }

    fn events(&self) -> Ready {
        Ready::read()
    }

    fn handle_events(&self, handle: Handle, events: Ready) {
        if self.canceled.load(Ordering::Acquire) {
            trace!("timer already canceled id={}", self.registration.id());
            return;
        }

        if !events.is_read() {
            warn!(
                "timer received unexpected events id={} events={:?}",
                self.registration.id(),
                events
            );
            return;
        }

        let occurrences = match sys::timerfd::read_expirations(handle.raw()) {
            Ok(occurrences) => occurrences,
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                trace!("timer has not expired id={}", self.registration.id());
                return;
            }
            Err(err) => panic!("timerfd read failed: {}", err),
        };

        let limit = Config::global().interval_occurrences_limit;

        let occurrences = if occurrences > limit {
            warn!(
                "too many stacked interval occurrences - reducing to {} id={}",
                limit,
                self.registration.id()
            );
            limit
        } else {
            occurrences
        };

        for _ in 0..occurrences {
            // A cancellation racing in mid-firing suppresses the rest.
            if self.canceled.load(Ordering::Acquire) {
                return;
            }

            if !(self.func)() {
                warn!(
                    "timer owner destroyed - stopping timer id={}",
                    self.registration.id()
                );
                self.cancel();
                return;
            }
        }

        if self.run_once {
            self.cancel();
        }
    }
}

impl Cancellable for TimerHandler {
    fn cancel(&self) {
        trace!("timer cancel id={}", self.registration.id());

        self.canceled.store(true, Ordering::Release);

        if let Some(event) = self.registration.event() {
            let event_loop = event.event_loop();

            event.close();

            if let Some(event_loop) = event_loop {
                event_loop.remove_internal(self.registration.id());
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn thunk_skips_a_dropped_owner() {
        use std::sync::atomic::AtomicUsize;

        let owner = Arc::new(AtomicUsize::new(0));
        let thunk = thunk(|owner: &Arc<AtomicUsize>| {
            owner.fetch_add(1, Ordering::SeqCst);
        }, &owner);

        assert!(thunk());
        assert_eq!(owner.load(Ordering::SeqCst), 1);

        let weak_probe = Arc::downgrade(&owner);
        drop(owner);
        assert!(weak_probe.upgrade().is_none());
        assert!(!thunk());
    }
}
