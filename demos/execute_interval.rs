use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ael::EventLoop;

fn main() {
    env_logger::init();

    let event_loop = EventLoop::create().unwrap();

    let ticks = Arc::new(AtomicUsize::new(0));

    let timer = event_loop
        .execute_interval(
            Duration::from_millis(500),
            |ticks| {
                let tick = ticks.fetch_add(1, Ordering::SeqCst) + 1;
                println!("tick {}", tick);
            },
            &ticks,
        )
        .unwrap();

    std::thread::sleep(Duration::from_secs(5));

    timer.cancel();
    println!("canceled after {} ticks", ticks.load(Ordering::SeqCst));

    EventLoop::destroy_all();
}
