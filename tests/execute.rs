mod common;

use std::sync::Arc;
use std::time::Duration;

use ael::EventLoop;

use common::CountDownLatch;

#[test]
fn basic() {
    common::init_logger();

    let count = 5;

    let event_loop = EventLoop::create().unwrap();
    let latch = Arc::new(CountDownLatch::new(count));

    for _ in 0..count {
        event_loop.execute_once(|latch| latch.dec(), &latch);
    }

    assert!(latch.wait(Duration::from_secs(5)));
}

#[test]
fn advanced() {
    common::init_logger();

    let count = 250;
    let event_loop_count = 50;

    let mut event_loops = Vec::new();

    for _ in 0..event_loop_count {
        event_loops.push(EventLoop::create().unwrap());
    }

    let latch = Arc::new(CountDownLatch::new(count * event_loop_count));

    for _ in 0..count {
        for event_loop in &event_loops {
            event_loop.execute_once(|latch| latch.dec(), &latch);
        }
    }

    assert!(latch.wait(Duration::from_secs(10)));
}

#[test]
fn dropped_owner_is_skipped() {
    common::init_logger();

    let event_loop = EventLoop::create().unwrap();

    let probe = Arc::new(CountDownLatch::new(1));
    let owner = Arc::new(());

    let fired = {
        let probe = probe.clone();
        move |_owner: &Arc<()>| probe.dec()
    };

    let timer = event_loop
        .execute_once_in(Duration::from_millis(100), fired, &owner)
        .unwrap();

    drop(owner);

    assert!(!probe.wait(Duration::from_millis(400)));
    assert_eq!(probe.count(), 1);

    timer.cancel();
}
