//! Mode-specific configuration as a tagged union
//!
//! The profile file carries `modeConfig` as an untyped mapping discriminated
//! by the sibling `mode` field; in code it is a sum type so every use site
//! matches exhaustively.

use serde::Serialize;

use crate::error::Result;
use crate::profile::timeseries::TimeSeriesConfig;
use crate::profile::weighted::WeightedRandomConfig;
use crate::profile::ExecutionMode;

/// Mode-specific configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ModeConfig {
    /// Requests drawn randomly from a weighted distribution.
    WeightedRandom(WeightedRandomConfig),
    /// Requests replayed from time-bucketed audit logs.
    TimeSeries(TimeSeriesConfig),
}

impl ModeConfig {
    /// The execution mode this configuration belongs to.
    pub fn mode(&self) -> ExecutionMode {
        match self {
            ModeConfig::WeightedRandom(_) => ExecutionMode::WeightedRandom,
            ModeConfig::TimeSeries(_) => ExecutionMode::TimeSeries,
        }
    }

    /// Apply explicitly-set CLI overrides; rejects overrides the mode does
    /// not support.
    pub fn apply_overrides(&mut self, overrides: &ModeOverrides) -> Result<()> {
        match self {
            ModeConfig::WeightedRandom(config) => {
                config.apply_overrides(overrides);
                Ok(())
            }
            ModeConfig::TimeSeries(config) => config.apply_overrides(overrides),
        }
    }

    /// Mode-specific validation and normalisation, with CLI-supplied
    /// defaults.
    pub fn validate(&mut self, defaults: &OverrideDefaults) -> Result<()> {
        match self {
            ModeConfig::WeightedRandom(config) => config.validate(defaults),
            ModeConfig::TimeSeries(config) => config.validate(defaults),
        }
    }

    /// Client-side QPS limit the REST clients should be configured with;
    /// zero means no limit.
    pub fn client_qps(&self) -> f64 {
        match self {
            ModeConfig::WeightedRandom(config) => config.client_qps(),
            ModeConfig::TimeSeries(config) => config.client_qps(),
        }
    }
}

/// CLI override values; `None` means the flag was not set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModeOverrides {
    /// Maximum requests per second.
    pub rate: Option<f64>,
    /// Total number of requests.
    pub total: Option<usize>,
    /// Running time in seconds.
    pub duration: Option<u64>,
    /// Time bucket interval.
    pub interval: Option<String>,
}

impl ModeOverrides {
    /// Whether no override was set.
    pub fn is_empty(&self) -> bool {
        self.rate.is_none()
            && self.total.is_none()
            && self.duration.is_none()
            && self.interval.is_none()
    }
}

/// Default values supplied by the CLI, applied when the profile leaves the
/// corresponding fields unset.
#[derive(Debug, Clone, Default)]
pub struct OverrideDefaults {
    /// Default total number of requests.
    pub total: Option<usize>,
}
