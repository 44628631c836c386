//! Byte-stream client.
//!
//! Each request opens its own connection: connect, write one frame, read one
//! frame, hang up. This is how the desktop controller talks to the host.

use serde_json::Value;
use tokio::net::TcpStream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::codec::{read_message, write_message};
use crate::envelope::{Request, Response, validate_command_name};
use crate::error::NetError;

/// Default byte-stream address.
pub const DEFAULT_PIPE_ADDR: &str = "127.0.0.1:8889";

/// The environment variable used to override the byte-stream address.
pub const PIPE_ADDR_ENV: &str = "SCALE_BRIDGE_PIPE";

/// Default upper bound on one reply frame.
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// Client for the host's byte-stream transport.
#[derive(Debug, Clone)]
pub struct PipeConnection {
    addr: String,
    max_frame_len: usize,
}

impl PipeConnection {
    /// Use the address from `SCALE_BRIDGE_PIPE`, falling back to
    /// [`DEFAULT_PIPE_ADDR`].
    #[must_use]
    pub fn from_env() -> Self {
        let addr = std::env::var(PIPE_ADDR_ENV).unwrap_or_else(|_| DEFAULT_PIPE_ADDR.to_string());
        Self::new(addr)
    }

    /// Use the given `host:port`.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Override the reply size limit.
    #[must_use]
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Returns the address this client dials.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send `command` with a fresh correlation id and wait for the reply.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::InvalidCommandName`] before dialling if `command`
    /// is malformed, or any error from [`PipeConnection::send`].
    pub async fn request(&self, command: &str, data: Option<Value>) -> Result<Response, NetError> {
        validate_command_name(command)?;
        let mut request = Request::new(command).with_uuid(Uuid::new_v4().to_string());
        request.data = data;
        self.send(&request).await
    }

    /// Send a prepared request and wait for the reply.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Connect`] if the host is unreachable, or a framing
    /// or decoding error from the exchange.
    pub async fn send(&self, request: &Request) -> Result<Response, NetError> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|source| NetError::Connect {
                addr: self.addr.clone(),
                source,
            })?;
        info!(addr = %self.addr, command = ?request.command, "sending request");

        write_message(&mut stream, request).await?;
        let response: Response = read_message(&mut stream, self.max_frame_len).await?;
        debug!(kind = ?response.kind, uuid = ?response.uuid, "received reply");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;
    use crate::envelope::ResponseType;

    #[tokio::test]
    async fn test_request_echoes_correlation_id() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request: Request = read_message(&mut stream, 1024).await.unwrap();
            assert_eq!(request.command.as_deref(), Some("GetGameSettings"));
            let reply = Response::success("OK").with_uuid(request.uuid.clone().unwrap());
            write_message(&mut stream, &reply).await.unwrap();
            request.uuid.unwrap()
        });

        let client = PipeConnection::new(addr.to_string());
        let reply = client.request("GetGameSettings", None).await.unwrap();
        let sent_uuid = server.await.unwrap();

        assert_eq!(reply.kind, ResponseType::Success);
        assert_eq!(reply.uuid, Some(sent_uuid));
    }

    #[tokio::test]
    async fn test_invalid_name_rejected_before_connect() {
        let client = PipeConnection::new("127.0.0.1:1");
        let err = client.request("Nope;", None).await.unwrap_err();
        assert!(matches!(err, NetError::InvalidCommandName(_)));
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = PipeConnection::new(addr.to_string());
        let err = client.request("GetGameSettings", None).await.unwrap_err();
        assert!(matches!(err, NetError::Connect { .. }));
    }

    #[test]
    fn test_new_keeps_address() {
        let client = PipeConnection::new("10.0.0.2:9000").with_max_frame_len(16);
        assert_eq!(client.addr(), "10.0.0.2:9000");
        assert_eq!(client.max_frame_len, 16);
    }
}
