use std::sync::Arc;
use std::time::Duration;

use ael::EventLoop;

fn main() {
    env_logger::init();

    let event_loop = EventLoop::create().unwrap();

    let name = Arc::new("world".to_string());

    event_loop.execute_once(|name| println!("hello, {}!", name), &name);

    event_loop
        .execute_once_in(
            Duration::from_secs(1),
            |name| println!("hello again, {}!", name),
            &name,
        )
        .unwrap();

    std::thread::sleep(Duration::from_secs(2));

    EventLoop::destroy_all();
}
