//! Time-series replay execution mode configuration

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::profile::mode::{ModeOverrides, OverrideDefaults};
use crate::profile::request::GroupVersionResource;

/// Configuration for the time-series execution mode, replaying requests from
/// time-bucketed audit logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesConfig {
    /// Time bucket size the series was recorded with (e.g. "1s", "100ms").
    #[serde(default)]
    pub interval: String,
    /// The time-bucketed requests, processed in order.
    #[serde(default)]
    pub buckets: Vec<RequestBucket>,
}

/// Requests for one time slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBucket {
    /// Relative time in seconds from benchmark start.
    #[serde(default)]
    pub start_time: f64,
    /// The exact requests to execute in this bucket.
    #[serde(default)]
    pub requests: Vec<ExactRequest>,
}

/// HTTP method of an exact request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    /// GET a single object
    Get,
    /// LIST a collection
    List,
    /// POST (create)
    Post,
    /// PUT (replace)
    Put,
    /// PATCH (update)
    Patch,
    /// DELETE
    Delete,
}

impl Default for RequestMethod {
    fn default() -> Self {
        RequestMethod::Get
    }
}

/// A single exact API request as recorded in an audit log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactRequest {
    /// HTTP method.
    #[serde(default)]
    pub method: RequestMethod,
    /// Resource URI.
    #[serde(flatten)]
    pub gvr: GroupVersionResource,
    /// Object namespace.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Object name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Request body for POST/PUT/PATCH.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    /// Patch encoding for PATCH requests.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub patch_type: String,
    /// Label selector for LIST requests.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label_selector: String,
    /// Field selector for LIST requests.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field_selector: String,
    /// Page size for LIST requests.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub limit: i64,
    /// Resource version for consistency control.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

impl TimeSeriesConfig {
    /// Apply explicitly-set CLI overrides. Rate, total and duration have no
    /// meaning here, pacing comes from the bucket start times.
    pub fn apply_overrides(&mut self, overrides: &ModeOverrides) -> Result<()> {
        if overrides.rate.is_some() || overrides.total.is_some() || overrides.duration.is_some() {
            return Err(Error::Validation(
                "rate, total and duration overrides are not supported in time-series mode"
                    .to_string(),
            ));
        }
        if let Some(interval) = &overrides.interval {
            self.interval = interval.clone();
        }
        Ok(())
    }

    /// Validate the interval format and bucket offsets.
    pub fn validate(&mut self, _defaults: &OverrideDefaults) -> Result<()> {
        if !self.interval.is_empty() && humantime::parse_duration(&self.interval).is_err() {
            return Err(Error::Validation(format!(
                "invalid interval: {:?}",
                self.interval
            )));
        }

        for bucket in &self.buckets {
            if bucket.start_time < 0.0 || !bucket.start_time.is_finite() {
                return Err(Error::Validation(format!(
                    "bucket startTime must be finite and >= 0: {}",
                    bucket.start_time
                )));
            }
        }

        Ok(())
    }

    /// Client-side QPS hint; zero because the bucket timing is the pacing.
    pub fn client_qps(&self) -> f64 {
        0.0
    }
}
