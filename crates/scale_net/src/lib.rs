//! # scale_net
//!
//! Wire layer shared by the scale bridge and its controllers.
//!
//! This crate provides:
//!
//! - [`envelope`] — Request, response and push envelopes plus command-name validation.
//! - [`names`] — Command names, push contexts and reply texts.
//! - [`codec`] — JSON encoding and 4-byte length-prefixed framing.
//! - [`connection`] — One-request-per-connection byte-stream client.
//! - [`error`] — Network-layer error types.
//!
//! ## Framing
//!
//! On the byte-stream transport every envelope is preceded by its length as a
//! little-endian `u32`. The socket transport sends one envelope per text frame
//! with no prefix.

pub mod codec;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod names;

pub use codec::{
    decode, encode, read_frame, read_frame_within, read_message, write_frame, write_message,
};
pub use connection::PipeConnection;
pub use envelope::{Request, Response, ResponseType, ScaleEntry, validate_command_name};
pub use error::NetError;
