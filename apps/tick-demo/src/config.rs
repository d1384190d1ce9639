use std::{fs, path::Path};

use anyhow::{ensure, Result};
use newengine_tick::SchedulerConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    /// How often the host calls `Scheduler::advance`.
    #[serde(default = "default_heartbeat_hz")]
    pub heartbeat_hz: u32,
    /// Hard stop for the demo loop. `0` runs until the scheduler drains or ctrl-c.
    #[serde(default = "default_run_for_ms")]
    pub run_for_ms: u32,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_heartbeat_hz() -> u32 { 60 }
fn default_run_for_ms() -> u32 { 10_000 }

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            heartbeat_hz: default_heartbeat_hz(),
            run_for_ms: default_run_for_ms(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl DemoConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: DemoConfig = toml::from_str(text)?;
        ensure!(cfg.heartbeat_hz > 0, "heartbeat_hz must be positive");
        ensure!(cfg.scheduler.default_framerate > 0, "scheduler.default_framerate must be positive");
        Ok(cfg)
    }

    pub fn load_toml(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    #[inline]
    pub fn heartbeat_sec(&self) -> f32 {
        1.0 / self.heartbeat_hz as f32
    }
}
