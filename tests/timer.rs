mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ael::EventLoop;

fn counting(counter: &Arc<AtomicUsize>) {
    counter.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn once_in_delivers_exactly_once() {
    common::init_logger();

    let event_loop = EventLoop::create().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    let timer = event_loop
        .execute_once_in(Duration::from_millis(50), counting, &counter)
        .unwrap();

    assert!(common::wait_for(Duration::from_secs(2), || {
        counter.load(Ordering::SeqCst) == 1
    }));

    thread::sleep(Duration::from_millis(150));
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    // Cancel after delivery is a no-op, twice over.
    timer.cancel();
    timer.cancel();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn interval_then_cancel() {
    common::init_logger();

    let event_loop = EventLoop::create().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    let timer = event_loop
        .execute_interval(Duration::from_millis(10), counting, &counter)
        .unwrap();

    thread::sleep(Duration::from_millis(40));
    timer.cancel();

    let observed = counter.load(Ordering::SeqCst);
    assert!(
        (3..=5).contains(&observed),
        "observed {} deliveries",
        observed
    );

    // No further deliveries after cancellation.
    thread::sleep(Duration::from_millis(60));
    assert_eq!(counter.load(Ordering::SeqCst), observed);

    timer.cancel();
    assert_eq!(counter.load(Ordering::SeqCst), observed);
}

#[test]
fn cancel_before_first_fire_suppresses_all() {
    common::init_logger();

    let event_loop = EventLoop::create().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    let timer = event_loop
        .execute_once_in(Duration::from_millis(200), counting, &counter)
        .unwrap();

    thread::sleep(Duration::from_millis(20));
    timer.cancel();

    thread::sleep(Duration::from_millis(300));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn interval_in_respects_the_initial_delay() {
    common::init_logger();

    let event_loop = EventLoop::create().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    let timer = event_loop
        .execute_interval_in(Duration::from_millis(50), Duration::from_millis(200), counting, &counter)
        .unwrap();

    thread::sleep(Duration::from_millis(100));
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    assert!(common::wait_for(Duration::from_secs(2), || {
        counter.load(Ordering::SeqCst) >= 1
    }));

    timer.cancel();
}

#[test]
fn cancel_is_safe_from_another_thread() {
    common::init_logger();

    let event_loop = EventLoop::create().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    let timer = event_loop
        .execute_interval(Duration::from_millis(10), counting, &counter)
        .unwrap();

    let cancel_timer = timer.clone();
    let canceller = thread::spawn(move || cancel_timer.cancel());
    canceller.join().unwrap();

    let observed = counter.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(60));
    assert!(counter.load(Ordering::SeqCst) <= observed + 1);
}
