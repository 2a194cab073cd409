use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use engine_core::TickConfig;
use mud::{DispatchConfig, WorldSettings};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetSection {
    pub telnet_addr: String,
}

impl Default for NetSection {
    fn default() -> Self {
        Self {
            telnet_addr: "0.0.0.0:4000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickSection {
    pub tps: u32,
    /// Ticks between regeneration passes.
    pub regen_interval: u64,
    pub regen_amount: i32,
}

impl Default for TickSection {
    fn default() -> Self {
        Self {
            tps: 10,
            regen_interval: 10,
            regen_amount: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistSection {
    pub save_dir: String,
    /// Seconds between autosaves, 0 disables them.
    pub snapshot_interval_secs: u64,
    /// Upper bound on the shutdown save.
    pub save_timeout_secs: u64,
    /// Numbered snapshots kept next to `latest.bin`.
    pub keep: usize,
}

impl Default for PersistSection {
    fn default() -> Self {
        Self {
            save_dir: "data/snapshots".to_string(),
            snapshot_interval_secs: 300,
            save_timeout_secs: 30,
            keep: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: "data/player.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    pub max_workers: usize,
    pub batch_size: usize,
    pub prompt_timeout_secs: u64,
    pub barrier_timeout_secs: u64,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            max_workers: 64,
            batch_size: 32,
            prompt_timeout_secs: 60,
            barrier_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorldSection {
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
    pub player_respawn_ticks: u64,
    pub player_max_health: i32,
    pub player_max_special: i32,
}

impl Default for WorldSection {
    fn default() -> Self {
        let settings = WorldSettings::default();
        Self {
            seed: None,
            player_respawn_ticks: settings.player_respawn_ticks,
            player_max_health: settings.player_max_health,
            player_max_special: settings.player_max_special,
        }
    }
}

/// Top-level MUD server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub net: NetSection,
    pub tick: TickSection,
    pub persistence: PersistSection,
    pub database: DatabaseSection,
    pub dispatch: DispatchSection,
    pub world: WorldSection,
}

impl ServerConfig {
    /// Load configuration from an optional TOML file path.
    pub fn load(config_path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let config = match config_path {
            Some(path) if Path::new(path).exists() => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            _ => Self::default(),
        };
        Ok(config)
    }

    pub fn to_tick_config(&self) -> TickConfig {
        TickConfig {
            tps: self.tick.tps,
            max_ticks: 0,
        }
    }

    pub fn to_dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            max_workers: self.dispatch.max_workers,
            batch_size: self.dispatch.batch_size,
            ..DispatchConfig::default()
        }
    }

    pub fn to_world_settings(&self) -> WorldSettings {
        WorldSettings {
            regen_interval: self.tick.regen_interval,
            regen_amount: self.tick.regen_amount,
            player_respawn_ticks: self.world.player_respawn_ticks,
            player_max_health: self.world.player_max_health,
            player_max_special: self.world.player_max_special,
            barrier_timeout: Duration::from_secs(self.dispatch.barrier_timeout_secs),
            prompt_timeout: Duration::from_secs(self.dispatch.prompt_timeout_secs),
        }
    }

    pub fn autosave_interval(&self) -> Option<Duration> {
        (self.persistence.snapshot_interval_secs > 0)
            .then(|| Duration::from_secs(self.persistence.snapshot_interval_secs))
    }

    pub fn save_timeout(&self) -> Duration {
        Duration::from_secs(self.persistence.save_timeout_secs.max(1))
    }
}

/// Parse CLI arguments and load config.
/// Supports: --config <path>
pub fn parse_cli_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<&str> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if let Some(val) = args.get(i + 1) {
                    config_path = Some(val.as_str());
                    i += 2;
                } else {
                    eprintln!("--config requires a path argument");
                    std::process::exit(1);
                }
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(1);
            }
        }
    }

    match ServerConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    }
}
