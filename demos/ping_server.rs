use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use ael::stream::{NewConnectionHandler, StreamBuffer, StreamBufferHandler, StreamListener};
use ael::{DataView, EventLoop, Handle};

struct PingServer {
    weak_self: Weak<PingServer>,
    event_loop: Arc<EventLoop>,
    buffers: Mutex<Vec<Arc<StreamBuffer>>>,
}

impl NewConnectionHandler for PingServer {
    fn handle_new_connection(&self, handle: Handle) {
        let myself = self.weak_self.upgrade().unwrap();

        let buffer = StreamBuffer::create_for_server(&myself, handle);
        self.buffers.lock().unwrap().push(buffer.clone());
        self.event_loop.attach(&buffer);
    }
}

impl StreamBufferHandler for PingServer {
    fn handle_data(&self, stream_buffer: &Arc<StreamBuffer>, data: &DataView) {
        if data.data() == b"ping" {
            println!("ping -> pong");
            stream_buffer.write(&DataView::from("pong"));
        }
    }

    fn handle_connected(&self, _stream_buffer: &Arc<StreamBuffer>) {
        println!("connection established");
    }

    fn handle_eof(&self, stream_buffer: &Arc<StreamBuffer>) {
        println!("connection closed");
        self.buffers
            .lock()
            .unwrap()
            .retain(|buffer| !Arc::ptr_eq(buffer, stream_buffer));
    }
}

fn main() {
    env_logger::init();

    let event_loop = EventLoop::create().unwrap();

    let server = Arc::new_cyclic(|weak_self| PingServer {
        weak_self: weak_self.clone(),
        event_loop: event_loop.clone(),
        buffers: Mutex::new(Vec::new()),
    });

    let listener = StreamListener::create(&server, "127.0.0.1", 9090).unwrap();
    event_loop.attach(&listener);

    println!("listening on 127.0.0.1:9090");

    loop {
        std::thread::sleep(Duration::from_secs(60));
    }
}
