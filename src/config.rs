//! Tracker configuration. Values are layered: built-in defaults, then a TOML file, then
//! `TICKLET_*` environment variables, then command line overrides.

use std::{path::Path, time::Duration};

use anyhow::{anyhow, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::daemon::collection::{idle::IdleEvaluator, tracker::TrackerSettings};

pub const ENV_PREFIX: &str = "TICKLET_";

/// Upper bound for every duration setting: one year.
pub const MAX_DURATION_SECS: u64 = 366 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub poll_interval_secs: u64,
    /// How long a new application/window pair has to stay focused to count as a switch.
    pub debounce_window_secs: u64,
    /// Entries shorter than this are dropped, idle entries excepted.
    pub min_entry_duration_secs: u64,
    /// Time without user activity after which the user is considered idle.
    pub idle_threshold_secs: u64,
    /// Finalize the open entry on shutdown instead of abandoning it.
    pub finalize_on_stop: bool,
}

/// Values given on the command line. Unset fields leave the layered value alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalize_on_stop: Option<bool>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1,
            debounce_window_secs: 3,
            min_entry_duration_secs: 3,
            idle_threshold_secs: 300,
            finalize_on_stop: false,
        }
    }
}

impl TrackerConfig {
    /// Loads configuration, reading `config_path` when it is given. A missing file is treated
    /// like an empty one, and `overrides` take precedence over everything.
    pub fn load(config_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(overrides));

        let config: Self = figment
            .extract()
            .with_context(|| format!("Failed to load configuration from {config_path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(anyhow!("poll_interval_secs has to be at least 1"));
        }
        for (name, value) in [
            ("poll_interval_secs", self.poll_interval_secs),
            ("debounce_window_secs", self.debounce_window_secs),
            ("min_entry_duration_secs", self.min_entry_duration_secs),
            ("idle_threshold_secs", self.idle_threshold_secs),
        ] {
            if value > MAX_DURATION_SECS {
                return Err(anyhow!(
                    "{name} can be at most {MAX_DURATION_SECS} seconds, got {value}"
                ));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Durations beyond [MAX_DURATION_SECS] are clamped. [TrackerConfig::validate] rejects them
    /// for loaded configurations.
    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            debounce_window: bounded_seconds(self.debounce_window_secs),
            min_entry_duration: bounded_seconds(self.min_entry_duration_secs),
            idle: IdleEvaluator::new(bounded_seconds(self.idle_threshold_secs)),
        }
    }
}

fn bounded_seconds(value: u64) -> chrono::Duration {
    chrono::Duration::seconds(value.min(MAX_DURATION_SECS) as i64)
}
