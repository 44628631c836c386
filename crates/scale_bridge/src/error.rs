//! Bridge error types.

use std::net::SocketAddr;

use scale_net::Response;
use scale_net::names::messages;

/// Failures while binding a request's `data` to a command's parameters.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// A parameter without a default had no matching property.
    #[error("missing parameter `{name}`")]
    MissingParameter {
        /// Parameter name.
        name: String,
    },

    /// A property could not be converted to the parameter's type.
    #[error("parameter `{name}` failed to parse: {source}")]
    ParameterParse {
        /// Parameter name.
        name: String,
        /// Conversion error.
        #[source]
        source: serde_json::Error,
    },

    /// `data` was present but not a JSON object.
    #[error("request data is not an object")]
    DataNotObject,
}

/// Reasons a request is rejected before it reaches the work queue.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Undecodable envelope, missing or malformed command name, or non-object data.
    #[error("malformed request: {0}")]
    Format(String),

    /// No command is registered under this name.
    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    /// Arguments did not bind.
    #[error("invalid parameters for `{command}`: {source}")]
    Binding {
        /// Command being bound.
        command: String,
        /// What went wrong.
        #[source]
        source: BindError,
    },
}

impl DispatchError {
    /// The error reply sent to the caller.
    ///
    /// Messages are generic; details such as parameter names stay in the log.
    #[must_use]
    pub fn reply(&self) -> Response {
        match self {
            Self::Format(_) => Response::error(messages::UNKNOWN_DATA_STRUCTURE),
            Self::UnknownCommand(_) => Response::error(messages::UNKNOWN_COMMAND),
            Self::Binding { .. } => Response::error(messages::INVALID_PARAMETERS),
        }
    }
}

/// Failures saving the persisted scales.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Writing or removing the file failed.
    #[error("persistence I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The scales could not be serialised.
    #[error("failed to encode scales: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failures starting or stopping the bridge server.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A listener could not bind its address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// The background runtime could not be built.
    #[error("failed to build runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// The background thread could not be spawned.
    #[error("failed to spawn bridge thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// [`Bridge::listen`](crate::Bridge::listen) was called twice.
    #[error("bridge is already listening")]
    AlreadyListening,
}
