use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Configuration for the statistics engine.
///
/// All durations are parsed from humantime strings (e.g. "5m", "1ms").
#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    /// Samples longer than this are logged and discarded instead of
    /// aggregated. Default: 5m.
    #[serde(default = "default_reported_time_threshold", with = "humantime_serde")]
    pub reported_time_threshold: Duration,

    /// How long the drain task sleeps when the ingest queue is empty.
    /// Default: 1ms.
    #[serde(default = "default_drain_backoff", with = "humantime_serde")]
    pub drain_backoff: Duration,
}

// --- Default value functions ---

fn default_reported_time_threshold() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_drain_backoff() -> Duration {
    Duration::from_millis(1)
}

// --- Default trait impls ---

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            reported_time_threshold: default_reported_time_threshold(),
            drain_backoff: default_drain_backoff(),
        }
    }
}

// --- Validation and loading ---

impl StatsConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: StatsConfig = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.reported_time_threshold.is_zero() {
            bail!("reported_time_threshold must be positive");
        }

        if self.drain_backoff.is_zero() {
            bail!("drain_backoff must be positive");
        }

        Ok(())
    }
}
