//! Network-layer error types.

/// Errors that can occur while encoding, framing or exchanging envelopes.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Failed to encode a message to JSON.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// Failed to decode a message from JSON.
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    /// Underlying read or write failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A length prefix announced more bytes than the receiver accepts.
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// Announced payload length.
        len: usize,
        /// Largest payload the receiver accepts.
        max: usize,
    },

    /// The peer hung up before a whole frame arrived.
    #[error("peer closed connection after {read} of {expected} bytes")]
    PeerClosed {
        /// Bytes received before the close.
        read: usize,
        /// Bytes the current read needed.
        expected: usize,
    },

    /// The peer did not deliver a whole frame in time.
    #[error("no complete frame within {after:?}")]
    TimedOut {
        /// How long the receiver waited.
        after: std::time::Duration,
    },

    /// A command name contained characters outside `[A-Za-z0-9]`.
    #[error("invalid command name: {0:?}")]
    InvalidCommandName(String),

    /// Could not open a connection to the host.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Address that was dialled.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },
}
