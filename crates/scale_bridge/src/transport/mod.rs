//! Transports that feed the shared dispatch path.
//!
//! - [`pipe`] — length-prefixed byte stream, one request per connection.
//! - [`socket`] — WebSocket text frames on a persistent, multiplexed channel.
//! - [`filter`] — coarse origin filter for the socket transport.

pub mod filter;
pub mod pipe;
pub mod socket;

pub use filter::is_local_origin;
pub use pipe::{PipeLimits, PipeReplySink, run_pipe_listener, serve_connection};
pub use socket::{ConnectionRegistry, SocketReplySink, SocketState, serve_socket};
