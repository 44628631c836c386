//! Host tick loop.
//!
//! Each tick:
//!
//! 1. Drain the bridge work queue against the host.
//! 2. Advance the simulated cast and collect the ids on screen.
//! 3. Write the active ids, firing a push on change.
//! 4. Advance the tick counter.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use scale_bridge::{Bridge, ScaleHost};

/// Configuration for the host tick loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

/// Simulated producer of on-screen characters.
///
/// A fixed cast walks on and off screen: character `i` is visible while
/// `(tick / period + i) % 3 != 0`, so the active set changes once per period.
#[derive(Debug, Clone)]
pub struct DemoCast {
    cast: Vec<u32>,
    period: u64,
}

impl DemoCast {
    /// Create a cast of `cast` ids whose visibility changes every `period` ticks.
    #[must_use]
    pub fn new(cast: Vec<u32>, period: u64) -> Self {
        Self {
            cast,
            period: period.max(1),
        }
    }

    /// Ids on screen at `tick`, in cast order.
    #[must_use]
    pub fn visible_at(&self, tick: u64) -> Vec<u32> {
        let phase = tick / self.period;
        self.cast
            .iter()
            .enumerate()
            .filter(|(i, _)| (phase + *i as u64) % 3 != 0)
            .map(|(_, id)| *id)
            .collect()
    }
}

impl Default for DemoCast {
    fn default() -> Self {
        Self::new(vec![100, 101, 102, 103, 104], 120)
    }
}

/// The host's tick loop state.
#[derive(Debug)]
pub struct TickLoop {
    tick_id: u64,
    config: TickConfig,
    host: ScaleHost,
    bridge: Bridge<ScaleHost>,
    cast: DemoCast,
}

impl TickLoop {
    /// Create a tick loop driving `host` and draining `bridge`.
    #[must_use]
    pub fn new(config: TickConfig, host: ScaleHost, bridge: Bridge<ScaleHost>, cast: DemoCast) -> Self {
        Self {
            tick_id: 0,
            config,
            host,
            bridge,
            cast,
        }
    }

    /// Returns the current tick counter.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Returns the host.
    #[must_use]
    pub fn host(&self) -> &ScaleHost {
        &self.host
    }

    /// Returns the bridge.
    pub fn bridge_mut(&mut self) -> &mut Bridge<ScaleHost> {
        &mut self.bridge
    }

    /// Run one tick.
    pub fn tick(&mut self) {
        let ran = self.bridge.drain_once(&mut self.host);

        let visible = self.cast.visible_at(self.tick_id);
        if let Err(err) = self.host.store_mut().write_active_ids(&visible) {
            warn!(tick_id = self.tick_id, %err, "active ids not written");
        }

        self.tick_id += 1;
        if ran > 0 {
            debug!(tick_id = self.tick_id, ran, "tick ran bridge work");
        }
    }

    /// Run the tick loop for the configured number of ticks, or indefinitely.
    pub fn run(&mut self) {
        let tick_duration = Duration::from_secs_f64(1.0 / self.config.tick_rate);
        let mut tick_count = 0u64;

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting tick loop"
        );

        loop {
            let start = Instant::now();
            self.tick();

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(ticks = tick_count, "tick loop complete");
                break;
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
    }

    /// Stop the bridge and hand back the host.
    pub fn finish(mut self) -> ScaleHost {
        self.bridge.shutdown();
        self.host
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use scale_bridge::{ReplySink, ScalePersistence};
    use scale_net::{NetError, Request, Response};
    use scale_region::{ScaleStore, SharedRegion};
    use serde_json::json;

    use super::*;

    fn tick_loop(name: &str, config: TickConfig) -> TickLoop {
        let path = std::env::temp_dir().join(format!("scale_host_tick_{name}_{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let mut host = ScaleHost::new(
            ScaleStore::new(Arc::new(SharedRegion::new())),
            ScalePersistence::new(path),
            "TEST",
        );
        let bridge = Bridge::new(ScaleHost::command_registry());
        host.forward_active_changes(bridge.push_sender());
        TickLoop::new(config, host, bridge, DemoCast::new(vec![1, 2, 3], 2))
    }

    #[test]
    fn test_cast_visibility_cycles() {
        let cast = DemoCast::new(vec![10, 11, 12], 1);
        assert_eq!(cast.visible_at(0), vec![11, 12]);
        assert_eq!(cast.visible_at(1), vec![10, 11]);
        assert_eq!(cast.visible_at(2), vec![10, 12]);
        assert_eq!(cast.visible_at(3), cast.visible_at(0));
    }

    #[test]
    fn test_tick_advances_counter_and_writes_active_ids() {
        let mut tick_loop = tick_loop("advance", TickConfig::default());
        assert_eq!(tick_loop.tick_id(), 0);
        tick_loop.tick();
        assert_eq!(tick_loop.tick_id(), 1);
        assert_eq!(tick_loop.host().store().region().read_active_ids(), vec![2, 3]);
    }

    #[test]
    fn test_push_once_per_transition() {
        let mut tick_loop = tick_loop("push", TickConfig::default());
        for _ in 0..4 {
            tick_loop.tick();
        }
        // Phases 0 and 1 each hold for two ticks.
        assert_eq!(tick_loop.bridge_mut().pending_pushes().len(), 2);
    }

    #[derive(Debug)]
    struct DiscardSink;

    impl ReplySink for DiscardSink {
        fn set_correlation_id(&mut self, _id: Option<String>) {}

        fn send_reply(&mut self, _response: Response) -> Result<(), NetError> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    #[test]
    fn test_tick_drains_queued_work() {
        let mut tick_loop = tick_loop("drain", TickConfig::default());
        let request = Request::new("SetScales").with_data(json!({ "scales": [{ "id": 9, "scale": 2.0 }] }));
        tick_loop
            .bridge_mut()
            .dispatcher()
            .dispatch(Ok(request), Box::new(DiscardSink));
        assert!(tick_loop.host().store().read_scales().is_empty());

        tick_loop.tick();
        assert_eq!(tick_loop.host().store().read_scales().get(&9), Some(&2.0));
    }

    #[test]
    fn test_run_limited_ticks() {
        let config = TickConfig {
            tick_rate: 1000.0,
            max_ticks: 5,
        };
        let mut tick_loop = tick_loop("run", config);
        tick_loop.run();
        assert_eq!(tick_loop.tick_id(), 5);
    }
}
