pub mod scenario;

pub use scenario::{Action, LinkSpec, RouterSpec, Scenario, ScheduledAction};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::Timestamp;

pub const DEFAULT_TIMER_INTERVAL: Timestamp = 5.0;
pub const DEFAULT_ROUTE_TIMEOUT: Timestamp = 15.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Poison reverse instead of split horizon, and poison routes on link down.
    pub poison_mode: bool,
    /// Seconds without a refresh before a learned route is dropped.
    pub route_timeout: Timestamp,
    /// Seconds between periodic advertisements.
    pub timer_interval: Timestamp,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            poison_mode: false,
            route_timeout: DEFAULT_ROUTE_TIMEOUT,
            timer_interval: DEFAULT_TIMER_INTERVAL,
        }
    }
}

impl RouterConfig {
    pub fn poisoning() -> Self {
        Self {
            poison_mode: true,
            ..Self::default()
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading router config {}", path.display()))?;
        let config: RouterConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing router config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
