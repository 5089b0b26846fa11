use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use ael::stream::{StreamBuffer, StreamBufferHandler};
use ael::{DataView, EventLoop};

struct PingClient {
    done: Mutex<bool>,
    cond: Condvar,
}

impl PingClient {
    fn finish(&self) {
        *self.done.lock().unwrap() = true;
        self.cond.notify_all();
    }

    fn wait(&self, wait_time: Duration) -> bool {
        let done = self.done.lock().unwrap();
        let (done, _) = self
            .cond
            .wait_timeout_while(done, wait_time, |done| !*done)
            .unwrap();
        *done
    }
}

impl StreamBufferHandler for PingClient {
    fn handle_data(&self, stream_buffer: &Arc<StreamBuffer>, data: &DataView) {
        println!("received: {}", String::from_utf8_lossy(data.data()));
        stream_buffer.close();
    }

    fn handle_connected(&self, stream_buffer: &Arc<StreamBuffer>) {
        println!("connected - sending ping");
        stream_buffer.write(&DataView::from("ping"));
    }

    fn handle_eof(&self, _stream_buffer: &Arc<StreamBuffer>) {
        println!("connection closed");
        self.finish();
    }
}

fn main() {
    env_logger::init();

    let event_loop = EventLoop::create().unwrap();

    let client = Arc::new(PingClient {
        done: Mutex::new(false),
        cond: Condvar::new(),
    });

    let buffer = StreamBuffer::create_for_client(&client, "127.0.0.1", 9090).unwrap();
    event_loop.attach(&buffer);

    if !client.wait(Duration::from_secs(10)) {
        eprintln!("timed out waiting for the pong");
    }

    EventLoop::destroy_all();
}
