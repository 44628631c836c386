//! Bridge configuration.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

use scale_net::connection::DEFAULT_MAX_FRAME_LEN;

/// Default game code.
pub const DEFAULT_GAME: &str = "DFLT";

/// Default WebSocket listener address.
pub const DEFAULT_SOCKET_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 8888));

/// Default byte-stream listener address.
pub const DEFAULT_PIPE_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8889));

/// The environment variable used to override the WebSocket address.
pub const SOCKET_ADDR_ENV: &str = "SCALE_BRIDGE_SOCKET";

/// The environment variable used to override the byte-stream address.
pub const PIPE_ADDR_ENV: &str = scale_net::connection::PIPE_ADDR_ENV;

/// The environment variable used to override the game code.
pub const GAME_ENV: &str = "SCALE_BRIDGE_GAME";

/// Default time a byte-stream client gets to send its request frame.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the bridge listeners.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Game code reported by `GetGameSettings`.
    pub game: String,
    /// WebSocket listener address.
    pub socket_addr: SocketAddr,
    /// Byte-stream listener address. `None` disables the byte-stream transport.
    pub pipe_addr: Option<SocketAddr>,
    /// Refuse WebSocket peers outside loopback and private ranges.
    pub local_subnet_only: bool,
    /// Byte-stream requests in flight at once. Counted from the moment a
    /// request frame has been read until its reply is written, so idle
    /// connections never hold a slot.
    pub pipe_concurrency: usize,
    /// Time a byte-stream client gets to send its whole request frame.
    pub read_timeout: Duration,
    /// Persistence file. `None` uses `scales.json` next to the executable.
    pub persistence_path: Option<PathBuf>,
    /// Upper bound on waiting for the background thread at shutdown.
    pub shutdown_timeout: Duration,
    /// Largest inbound byte-stream frame accepted.
    pub max_frame_len: usize,
}

impl BridgeConfig {
    /// Create a config with defaults for everything but the game code.
    #[must_use]
    pub fn new(game: impl Into<String>) -> Self {
        Self {
            game: game.into(),
            ..Self::default()
        }
    }

    /// Override the WebSocket address.
    #[must_use]
    pub fn with_socket_addr(mut self, addr: SocketAddr) -> Self {
        self.socket_addr = addr;
        self
    }

    /// Override the byte-stream address, or disable it with `None`.
    #[must_use]
    pub fn with_pipe_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.pipe_addr = addr;
        self
    }

    /// Enable or disable the origin filter.
    #[must_use]
    pub fn with_local_subnet_only(mut self, local_only: bool) -> Self {
        self.local_subnet_only = local_only;
        self
    }

    /// Allow up to `concurrency` byte-stream requests in flight. Clamped to
    /// at least one.
    #[must_use]
    pub fn with_pipe_concurrency(mut self, concurrency: usize) -> Self {
        self.pipe_concurrency = concurrency.max(1);
        self
    }

    /// Override the byte-stream read timeout.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Override the persistence file.
    #[must_use]
    pub fn with_persistence_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persistence_path = Some(path.into());
        self
    }

    /// Override the shutdown timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Override the inbound frame limit.
    #[must_use]
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            game: DEFAULT_GAME.to_string(),
            socket_addr: DEFAULT_SOCKET_ADDR,
            pipe_addr: Some(DEFAULT_PIPE_ADDR),
            local_subnet_only: true,
            pipe_concurrency: 1,
            read_timeout: DEFAULT_READ_TIMEOUT,
            persistence_path: None,
            shutdown_timeout: Duration::from_secs(2),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}
