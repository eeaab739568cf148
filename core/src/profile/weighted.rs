//! Weighted-random execution mode configuration

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::profile::mode::{ModeOverrides, OverrideDefaults};
use crate::profile::request::WeightedRequest;

/// Configuration for the weighted-random execution mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightedRandomConfig {
    /// Maximum requests per second; zero means no limit.
    #[serde(default)]
    pub rate: f64,
    /// Total number of requests; zero means unbounded.
    #[serde(default)]
    pub total: usize,
    /// Running time in seconds; ignored when `total` is set.
    #[serde(default)]
    pub duration: u64,
    /// The request kinds with their weights.
    #[serde(default)]
    pub requests: Vec<WeightedRequest>,
}

impl WeightedRandomConfig {
    /// Apply explicitly-set CLI overrides.
    pub fn apply_overrides(&mut self, overrides: &ModeOverrides) {
        if let Some(rate) = overrides.rate {
            self.rate = rate;
        }
        if let Some(total) = overrides.total {
            self.total = total;
        }
        if let Some(duration) = overrides.duration {
            self.duration = duration;
        }
    }

    /// Normalise conflicting settings, apply CLI defaults and validate the
    /// request list.
    pub fn validate(&mut self, defaults: &OverrideDefaults) -> Result<()> {
        if self.total > 0 && self.duration > 0 {
            tracing::warn!(
                total = self.total,
                duration = self.duration,
                "both total and duration are set, duration will be ignored"
            );
            self.duration = 0;
        }

        if self.total == 0 && self.duration == 0 {
            if let Some(default_total) = defaults.total {
                self.total = default_total;
            }
        }

        if self.rate < 0.0 {
            return Err(crate::error::Error::Validation(format!(
                "rate requires >= 0: {}",
                self.rate
            )));
        }

        for request in &mut self.requests {
            request.validate()?;
        }

        Ok(())
    }

    /// Client-side QPS hint for this mode.
    pub fn client_qps(&self) -> f64 {
        self.rate
    }
}
