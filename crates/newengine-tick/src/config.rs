use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{TickError, TickResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Framerate used by [`Scheduler::frame_unit`](crate::Scheduler::frame_unit).
    #[serde(default = "default_framerate")]
    pub default_framerate: u32,
    /// Upper bound for a single heartbeat delta. `0` disables the clamp.
    #[serde(default)]
    pub max_dt_ms: u32,
    /// Emit a `debug!` summary for every heartbeat instead of `trace!`.
    #[serde(default)]
    pub log_heartbeats: bool,
}

fn default_framerate() -> u32 { crate::unit::DEFAULT_FRAMERATE }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_framerate: default_framerate(),
            max_dt_ms: 0,
            log_heartbeats: false,
        }
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(text: &str) -> TickResult<Self> {
        let cfg: SchedulerConfig =
            toml::from_str(text).map_err(|e| TickError::Config(e.to_string()))?;
        if cfg.default_framerate == 0 {
            return Err(TickError::InvalidFramerate(cfg.default_framerate));
        }
        Ok(cfg)
    }

    pub fn load_toml(path: impl AsRef<Path>) -> TickResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| TickError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Spike guard in seconds, if enabled.
    #[inline]
    pub fn max_dt_sec(&self) -> Option<f32> {
        (self.max_dt_ms > 0).then(|| self.max_dt_ms as f32 / 1000.0)
    }
}
