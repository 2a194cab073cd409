use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// What one combat/regen sweep did and how long it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickMetrics {
    pub tick_number: u64,
    pub duration_us: u128,
    /// Attacks, moves and replayed commands performed this tick.
    pub actions: usize,
    /// Creatures and players that took part in the sweep.
    pub combatants: usize,
    pub budget_us: u128,
}

impl TickMetrics {
    pub fn over_budget(&self) -> bool {
        self.duration_us > self.budget_us
    }

    pub fn log(&self) {
        if self.over_budget() {
            tracing::warn!(
                tick = self.tick_number,
                duration_us = self.duration_us,
                actions = self.actions,
                combatants = self.combatants,
                "tick exceeded budget ({}us > {}us)",
                self.duration_us,
                self.budget_us
            );
        } else if self.actions == 0 {
            tracing::debug!(tick = self.tick_number, duration_us = self.duration_us, "idle tick");
        } else {
            tracing::info!(
                tick = self.tick_number,
                duration_us = self.duration_us,
                actions = self.actions,
                combatants = self.combatants,
                "tick completed"
            );
        }
    }
}
