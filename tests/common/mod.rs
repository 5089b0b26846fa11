#![allow(dead_code)]

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Blocks callers until `count` decrements have happened.
pub struct CountDownLatch {
    count: Mutex<i64>,
    cond: Condvar,
}

impl CountDownLatch {
    pub fn new(count: i64) -> CountDownLatch {
        CountDownLatch {
            count: Mutex::new(count),
            cond: Condvar::new(),
        }
    }

    pub fn dec(&self) {
        let mut count = self.count.lock().unwrap();

        *count -= 1;

        if *count <= 0 {
            self.cond.notify_all();
        }
    }

    pub fn count(&self) -> i64 {
        *self.count.lock().unwrap()
    }

    pub fn wait(&self, wait_time: Duration) -> bool {
        let count = self.count.lock().unwrap();

        let (count, _) = self
            .cond
            .wait_timeout_while(count, wait_time, |count| *count > 0)
            .unwrap();

        *count <= 0
    }
}

/// Polls `cond` until it holds or `timeout` elapses.
pub fn wait_for<F>(timeout: Duration, cond: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;

    loop {
        if cond() {
            return true;
        }

        if Instant::now() >= deadline {
            return false;
        }

        std::thread::sleep(Duration::from_millis(10));
    }
}
