//! Shared fixtures for the end-to-end tests.

#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use scale_bridge::{Bridge, BridgeConfig, ScaleHost, ScalePersistence};
use scale_region::{ScaleStore, SharedRegion};

/// A host with a fresh region and an empty persistence file.
pub fn host(name: &str) -> ScaleHost {
    let dir = std::env::temp_dir().join(format!("scale_bridge_it_{name}_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("scales.json");
    let _ = std::fs::remove_file(&path);
    ScaleHost::new(
        ScaleStore::new(Arc::new(SharedRegion::new())),
        ScalePersistence::new(path),
        "TEST",
    )
}

/// Both listeners on ephemeral loopback ports.
pub fn loopback_config() -> BridgeConfig {
    let loopback = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0));
    BridgeConfig::new("TEST")
        .with_socket_addr(loopback)
        .with_pipe_addr(Some(loopback))
        .with_shutdown_timeout(Duration::from_secs(2))
}

/// Run `client` on its own thread and runtime while the calling thread ticks
/// the host, until the client finishes.
pub fn drive<R, F>(bridge: &Bridge<ScaleHost>, host: &mut ScaleHost, client: F) -> R
where
    R: Send + 'static,
    F: Future<Output = R> + Send + 'static,
{
    drive_with(bridge, host, client, |_| {})
}

/// Like [`drive`], calling `each_tick` on the host after every drain.
pub fn drive_with<R, F, H>(bridge: &Bridge<ScaleHost>, host: &mut ScaleHost, client: F, mut each_tick: H) -> R
where
    R: Send + 'static,
    F: Future<Output = R> + Send + 'static,
    H: FnMut(&mut ScaleHost),
{
    let (done_tx, done_rx) = mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let _ = done_tx.send(runtime.block_on(client));
    });

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        bridge.drain_once(host);
        each_tick(host);
        if let Ok(result) = done_rx.try_recv() {
            return result;
        }
        assert!(Instant::now() < deadline, "client never finished");
        std::thread::sleep(Duration::from_millis(5));
    }
}
