//! An asynchronous event library built around single-threaded epoll
//! reactors: each event loop owns one reactor and one thread, multiplexing
//! descriptor readiness, timers and cross-thread task submission. On top of
//! it sits a full-duplex stream abstraction with a composable filter chain
//! for inserting codecs between the socket and the user handler.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use ael::EventLoop;
//!
//! let event_loop = EventLoop::create().unwrap();
//!
//! struct Greeter;
//!
//! let greeter = Arc::new(Greeter);
//!
//! event_loop.execute_once(|_greeter| println!("hello from the loop thread"), &greeter);
//!
//! let timer = event_loop
//!     .execute_interval(Duration::from_secs(1), |_greeter| println!("tick"), &greeter)
//!     .unwrap();
//!
//! std::thread::sleep(Duration::from_secs(3));
//!
//! timer.cancel();
//! EventLoop::destroy_all();
//! ```

mod sys;

mod config;
mod data_view;
mod event;
mod event_loop;
mod handle;
mod reactor;
mod ready;

pub mod stream;

pub use bytes::Bytes;

pub use config::Config;
pub use data_view::DataView;
pub use event::{Cancellable, Event, EventHandler, Registration};
pub use event_loop::EventLoop;
pub use handle::Handle;
pub use ready::Ready;
