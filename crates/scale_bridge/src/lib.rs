//! # scale_bridge
//!
//! Moves commands from controllers onto the host's tick thread and replies
//! back out.
//!
//! This crate provides:
//!
//! - [`registry`] — Command registry and argument binding.
//! - [`invocation`] — Pending invocations, completions and the [`ReplySink`] seam.
//! - [`queue`] — Work queue drained once per host tick.
//! - [`dispatch`] — Shared decode → resolve → bind → enqueue path.
//! - [`push`] — Push channel and broadcaster.
//! - [`persistence`] — Scale persistence file.
//! - [`commands`] — [`ScaleHost`], the scale command target.
//! - [`transport`] — Byte-stream and WebSocket listeners.
//! - [`server`] — Background runtime thread with bounded shutdown.
//! - [`bridge`] — [`Bridge`], the host-facing handle.
//! - [`config`] — Bridge configuration.
//! - [`error`] — Bridge error types.
//!
//! ## Threads
//!
//! Only the host thread runs commands, through [`Bridge::drain_once`]. The
//! transports run on the `scale-bridge` thread and only enqueue. Each reply
//! is written by a short-lived `reply-writer` thread so a slow peer never
//! blocks the tick.

pub mod bridge;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod invocation;
pub mod persistence;
pub mod push;
pub mod queue;
pub mod registry;
pub mod server;
pub mod transport;

pub use bridge::Bridge;
pub use commands::ScaleHost;
pub use config::BridgeConfig;
pub use dispatch::Dispatcher;
pub use error::{BindError, BridgeError, DispatchError, PersistenceError};
pub use invocation::{Completion, PendingInvocation, ReplySink};
pub use persistence::ScalePersistence;
pub use push::PushSender;
pub use queue::{WorkQueue, WorkSender};
pub use registry::{BoundArgs, CommandRegistry, Param};
pub use server::BridgeServer;
