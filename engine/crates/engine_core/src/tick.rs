use std::time::{Duration, Instant};

/// Tick loop configuration.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Ticks per second.
    pub tps: u32,
    /// Maximum ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tps: 10,
            max_ticks: 0,
        }
    }
}

impl TickConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tps.max(1) as f64)
    }
}

/// Work done by one sweep, as reported by the system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub actions: usize,
    pub combatants: usize,
}

/// A recurring sweep driven by [`TickLoop`].
pub trait TickSystem {
    fn on_tick(&mut self, tick: u64) -> TickReport;
}

/// Fixed-rate scheduler for a [`TickSystem`]. Runs on the calling thread.
pub struct TickLoop<S: TickSystem> {
    pub system: S,
    pub config: TickConfig,
    pub current_tick: u64,
}

impl<S: TickSystem> TickLoop<S> {
    pub fn new(config: TickConfig, system: S) -> Self {
        Self {
            system,
            config,
            current_tick: 0,
        }
    }

    /// Execute a single tick.
    pub fn step(&mut self) -> observability::TickMetrics {
        let start = Instant::now();
        self.current_tick += 1;
        let report = self.system.on_tick(self.current_tick);
        let duration = start.elapsed();

        observability::TickMetrics {
            tick_number: self.current_tick,
            duration_us: duration.as_micros(),
            actions: report.actions,
            combatants: report.combatants,
            budget_us: self.config.tick_duration().as_micros(),
        }
    }

    /// Run until `max_ticks` is reached or `stop` returns true.
    /// Returns the number of ticks executed by this call.
    pub fn run_until(&mut self, mut stop: impl FnMut() -> bool) -> u64 {
        let tick_duration = self.config.tick_duration();
        let mut ran = 0;

        loop {
            if self.config.max_ticks > 0 && self.current_tick >= self.config.max_ticks {
                break;
            }
            if stop() {
                tracing::info!(tick = self.current_tick, "Tick loop stopping");
                break;
            }

            let tick_start = Instant::now();
            let metrics = self.step();
            metrics.log();
            ran += 1;

            // Sleep until next tick
            let elapsed = tick_start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            }
        }

        ran
    }

    /// Run for the configured number of ticks.
    pub fn run(&mut self) -> u64 {
        self.run_until(|| false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        seen: Vec<u64>,
    }

    impl TickSystem for Counter {
        fn on_tick(&mut self, tick: u64) -> TickReport {
            self.seen.push(tick);
            TickReport {
                actions: 1,
                combatants: 2,
            }
        }
    }

    #[test]
    fn tick_config_defaults() {
        let config = TickConfig::default();
        assert_eq!(config.tps, 10);
        assert_eq!(config.tick_duration().as_millis(), 100);
    }

    #[test]
    fn zero_tps_does_not_divide_by_zero() {
        let config = TickConfig { tps: 0, max_ticks: 0 };
        assert_eq!(config.tick_duration(), Duration::from_secs(1));
    }

    #[test]
    fn single_step_numbers_from_one() {
        let mut tick_loop = TickLoop::new(TickConfig::default(), Counter::default());
        let metrics = tick_loop.step();
        assert_eq!(metrics.tick_number, 1);
        assert_eq!(metrics.actions, 1);
        assert_eq!(metrics.combatants, 2);
        assert_eq!(tick_loop.system.seen, vec![1]);
    }

    #[test]
    fn run_stops_at_max_ticks() {
        let config = TickConfig {
            tps: 1000,
            max_ticks: 10,
        };
        let mut tick_loop = TickLoop::new(config, Counter::default());
        assert_eq!(tick_loop.run(), 10);
        assert_eq!(tick_loop.system.seen.len(), 10);
        assert_eq!(tick_loop.current_tick, 10);
    }

    #[test]
    fn run_until_honors_stop() {
        let config = TickConfig {
            tps: 1000,
            max_ticks: 0,
        };
        let mut tick_loop = TickLoop::new(config, Counter::default());
        let mut budget = 3;
        let ran = tick_loop.run_until(|| {
            if budget == 0 {
                return true;
            }
            budget -= 1;
            false
        });
        assert_eq!(ran, 3);
    }
}
