//! # scale_host — reference host
//!
//! Owns the shared scale region and drives it from a fixed-timestep tick
//! loop, standing in for the game-side hook.
//!
//! ## Startup Sequence
//!
//! 1. Attach the shared region and restore persisted scales.
//! 2. Start the bridge listeners (WebSocket and byte-stream).
//! 3. Enter the tick loop, draining bridge work once per tick.

mod tick;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scale_bridge::config::{
    DEFAULT_GAME, DEFAULT_PIPE_ADDR, DEFAULT_SOCKET_ADDR, GAME_ENV, PIPE_ADDR_ENV, SOCKET_ADDR_ENV,
};
use scale_bridge::{Bridge, BridgeConfig, ScaleHost, ScalePersistence};
use scale_region::{ScaleStore, SharedRegion};
use tick::{DemoCast, TickConfig, TickLoop};

#[derive(Parser)]
#[command(name = "scale_host", about = "Reference host for the character scale bridge")]
struct Args {
    /// Game code reported by GetGameSettings
    #[arg(short, long, env = GAME_ENV, default_value = DEFAULT_GAME)]
    game: String,

    /// WebSocket listener address
    #[arg(long, env = SOCKET_ADDR_ENV, default_value_t = DEFAULT_SOCKET_ADDR)]
    socket_addr: SocketAddr,

    /// Byte-stream listener address
    #[arg(long, env = PIPE_ADDR_ENV, default_value_t = DEFAULT_PIPE_ADDR)]
    pipe_addr: SocketAddr,

    /// Disable the byte-stream listener
    #[arg(long)]
    no_pipe: bool,

    /// Accept WebSocket peers outside loopback and private ranges
    #[arg(long)]
    allow_remote: bool,

    /// Byte-stream requests in flight at once
    #[arg(long, default_value_t = 1)]
    pipe_concurrency: usize,

    /// Time a byte-stream client gets to send its request, in milliseconds
    #[arg(long, default_value_t = 5000)]
    read_timeout_ms: u64,

    /// Scale persistence file (defaults to scales.json next to the executable)
    #[arg(long)]
    persistence: Option<PathBuf>,

    /// Target ticks per second
    #[arg(long, default_value_t = 60.0)]
    tick_rate: f64,

    /// Stop after this many ticks (0 = run until killed)
    #[arg(long, default_value_t = 0)]
    max_ticks: u64,

    /// Shutdown wait for the bridge thread, in milliseconds
    #[arg(long, default_value_t = 2000)]
    shutdown_ms: u64,
}

impl Args {
    fn bridge_config(&self) -> BridgeConfig {
        let mut config = BridgeConfig::new(self.game.clone())
            .with_socket_addr(self.socket_addr)
            .with_pipe_addr((!self.no_pipe).then_some(self.pipe_addr))
            .with_local_subnet_only(!self.allow_remote)
            .with_pipe_concurrency(self.pipe_concurrency)
            .with_read_timeout(Duration::from_millis(self.read_timeout_ms))
            .with_shutdown_timeout(Duration::from_millis(self.shutdown_ms));
        if let Some(path) = &self.persistence {
            config = config.with_persistence_path(path);
        }
        config
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("scale_host=info".parse()?)
                .add_directive("scale_bridge=info".parse()?),
        )
        .init();

    let args = Args::parse();
    if !(args.tick_rate.is_finite() && args.tick_rate > 0.0) {
        anyhow::bail!("tick rate must be a positive number, got {}", args.tick_rate);
    }
    let config = args.bridge_config();
    info!(game = %config.game, "scale host starting");

    let persistence = config
        .persistence_path
        .clone()
        .map_or_else(ScalePersistence::beside_executable, ScalePersistence::new);
    info!(path = %persistence.path().display(), "using scale persistence file");

    let mut host = ScaleHost::new(
        ScaleStore::new(SharedRegion::attach()),
        persistence,
        config.game.clone(),
    );

    let mut bridge = Bridge::new(ScaleHost::command_registry());
    host.forward_active_changes(bridge.push_sender());
    bridge.listen(&config).context("failed to start bridge listeners")?;
    info!(
        socket = ?bridge.socket_addr(),
        pipe = ?bridge.pipe_addr(),
        "bridge listening"
    );

    let tick_config = TickConfig {
        tick_rate: args.tick_rate,
        max_ticks: args.max_ticks,
    };
    let mut tick_loop = TickLoop::new(tick_config, host, bridge, DemoCast::default());
    tick_loop.run();

    let host = tick_loop.finish();
    info!(scales = host.store().read_scales().len(), "scale host shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_build_config() {
        let args = Args::try_parse_from([
            "scale_host",
            "--game",
            "SKYR",
            "--pipe-addr",
            "127.0.0.1:9001",
            "--pipe-concurrency",
            "4",
            "--read-timeout-ms",
            "250",
            "--allow-remote",
        ])
        .unwrap();
        let config = args.bridge_config();
        assert_eq!(config.game, "SKYR");
        assert_eq!(config.pipe_addr, Some(SocketAddr::from(([127, 0, 0, 1], 9001))));
        assert_eq!(config.pipe_concurrency, 4);
        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert!(!config.local_subnet_only);
    }

    #[test]
    fn test_no_pipe_disables_listener() {
        let args = Args::try_parse_from(["scale_host", "--no-pipe"]).unwrap();
        assert!(args.bridge_config().pipe_addr.is_none());
    }
}
