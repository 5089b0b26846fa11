//! The byte-stream layer: listeners, buffered full-duplex connections and
//! the composable filter chain between a socket and its user handler.

mod buffer;
mod filter;
mod listener;
mod tcp;

pub use buffer::{StreamBuffer, StreamBufferHandler};
pub use filter::{Chain, ConnectResult, InResult, OutResult, ShutdownResult, StreamBufferFilter};
pub use listener::{NewConnectionHandler, StreamListener};
pub use tcp::TcpStreamBufferFilter;
