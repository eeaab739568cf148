//! Load-profile model
//!
//! A load profile is the declarative description of the traffic to generate:
//! common connection/client settings plus a mode-specific configuration.
//! `modeConfig` is polymorphic over the `mode` field and resolved to the
//! concrete variant during deserialisation; profiles written before the mode
//! split (top-level `rate`/`total`/`duration`/`requests`) are migrated to
//! weighted-random on the fly.

mod mode;
mod request;
mod timeseries;
mod weighted;

pub use mode::{ModeConfig, ModeOverrides, OverrideDefaults};
pub use request::{
    GroupVersionResource, PatchType, RequestGet, RequestGetPodLog, RequestList, RequestPatch,
    RequestPostDel, RequestPut, RequestWatchList, WeightedRequest, WeightedRequestKind,
};
pub use timeseries::{ExactRequest, RequestBucket, RequestMethod, TimeSeriesConfig};
pub use weighted::WeightedRandomConfig;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Response serialisation format requested from the API server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// JSON responses
    Json,
    /// Protobuf responses
    Protobuf,
}

impl Default for ContentType {
    fn default() -> Self {
        ContentType::Json
    }
}

impl ContentType {
    /// Accept header value for this content type.
    pub fn accept_header(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::Protobuf => "application/vnd.kubernetes.protobuf",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::Json => write!(f, "json"),
            ContentType::Protobuf => write!(f, "protobuf"),
        }
    }
}

/// Execution strategy for generating requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Requests drawn randomly from a weighted distribution.
    #[serde(rename = "weighted-random")]
    WeightedRandom,
    /// Requests replayed from time-bucketed audit logs.
    #[serde(rename = "time-series")]
    TimeSeries,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::WeightedRandom => write!(f, "weighted-random"),
            ExecutionMode::TimeSeries => write!(f, "time-series"),
        }
    }
}

/// Load traffic from one host to the API server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProfileWire", into = "ProfileWire")]
pub struct LoadProfile {
    /// Schema version of this object; must be 1.
    pub version: u32,
    /// Free-form description.
    pub description: String,
    /// The load specs; a single-spec profile uses the `spec` key, multiple
    /// specs use `specs`.
    pub specs: Vec<LoadProfileSpec>,
}

impl LoadProfile {
    /// Parse a profile from YAML (JSON input parses through the same path).
    pub fn from_yaml(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }

    /// Validate the profile and normalise every spec.
    pub fn validate(&mut self, defaults: &OverrideDefaults) -> Result<()> {
        if self.version != 1 {
            return Err(Error::Validation(format!(
                "version should be 1, got {}",
                self.version
            )));
        }
        if self.specs.is_empty() {
            return Err(Error::Validation("at least one spec is required".to_string()));
        }
        for spec in &mut self.specs {
            spec.validate(defaults)?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ProfileWire {
    #[serde(default)]
    version: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spec: Option<LoadProfileSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    specs: Vec<LoadProfileSpec>,
}

impl TryFrom<ProfileWire> for LoadProfile {
    type Error = String;

    fn try_from(wire: ProfileWire) -> std::result::Result<Self, String> {
        let specs = match (wire.spec, wire.specs) {
            (Some(_), specs) if !specs.is_empty() => {
                return Err("spec and specs are mutually exclusive".to_string());
            }
            (Some(spec), _) => vec![spec],
            (None, specs) => specs,
        };
        Ok(LoadProfile {
            version: wire.version,
            description: wire.description,
            specs,
        })
    }
}

impl From<LoadProfile> for ProfileWire {
    fn from(mut profile: LoadProfile) -> Self {
        let (spec, specs) = if profile.specs.len() == 1 {
            (Some(profile.specs.remove(0)), Vec::new())
        } else {
            (None, profile.specs)
        };
        ProfileWire {
            version: profile.version,
            description: profile.description,
            spec,
            specs,
        }
    }
}

/// The load traffic for a target resource.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "SpecWire")]
pub struct LoadProfileSpec {
    /// Total number of long-lived connections used for traffic.
    pub conns: usize,
    /// Worker concurrency; when zero the scheduler falls back to `conns`.
    pub client: usize,
    /// Response content type.
    pub content_type: ContentType,
    /// Use HTTP/1.1 instead of HTTP/2 when true.
    pub disable_http2: bool,
    /// Retry ceiling for requests answered with 429 and Retry-After;
    /// zero means no retry.
    pub max_retries: usize,
    /// Mode-specific configuration; its variant determines the execution
    /// mode.
    pub mode_config: ModeConfig,
}

impl LoadProfileSpec {
    /// The execution mode of this spec.
    pub fn mode(&self) -> ExecutionMode {
        self.mode_config.mode()
    }

    /// Validate common fields, then the mode configuration.
    pub fn validate(&mut self, defaults: &OverrideDefaults) -> Result<()> {
        if self.conns == 0 {
            return Err(Error::Validation("conns requires > 0".to_string()));
        }
        if self.client == 0 {
            return Err(Error::Validation("client requires > 0".to_string()));
        }
        self.mode_config.validate(defaults)
    }
}

impl Serialize for LoadProfileSpec {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct SpecWireOut<'a> {
            conns: usize,
            client: usize,
            content_type: ContentType,
            #[serde(rename = "disableHTTP2")]
            disable_http2: bool,
            max_retries: usize,
            mode: ExecutionMode,
            mode_config: &'a ModeConfig,
        }

        SpecWireOut {
            conns: self.conns,
            client: self.client,
            content_type: self.content_type,
            disable_http2: self.disable_http2,
            max_retries: self.max_retries,
            mode: self.mode(),
            mode_config: &self.mode_config,
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpecWire {
    #[serde(default)]
    conns: usize,
    #[serde(default)]
    client: usize,
    #[serde(default)]
    content_type: ContentType,
    #[serde(default, rename = "disableHTTP2")]
    disable_http2: bool,
    #[serde(default)]
    max_retries: usize,
    #[serde(default)]
    mode: Option<ExecutionMode>,
    #[serde(default)]
    mode_config: Option<serde_yaml::Value>,

    // Legacy top-level fields from profiles written before the mode split.
    #[serde(default)]
    rate: f64,
    #[serde(default)]
    total: usize,
    #[serde(default)]
    duration: u64,
    #[serde(default)]
    requests: Vec<WeightedRequest>,
}

impl TryFrom<SpecWire> for LoadProfileSpec {
    type Error = String;

    fn try_from(wire: SpecWire) -> std::result::Result<Self, String> {
        let mode_config = match wire.mode {
            // Legacy format: no mode, request list at top level.
            None if !wire.requests.is_empty() => {
                ModeConfig::WeightedRandom(WeightedRandomConfig {
                    rate: wire.rate,
                    total: wire.total,
                    duration: wire.duration,
                    requests: wire.requests,
                })
            }
            None => return Err("mode is required".to_string()),
            Some(mode) => {
                let value = wire
                    .mode_config
                    .ok_or_else(|| "modeConfig is required".to_string())?;
                match mode {
                    ExecutionMode::WeightedRandom => ModeConfig::WeightedRandom(
                        serde_yaml::from_value(value)
                            .map_err(|err| format!("modeConfig for mode {mode}: {err}"))?,
                    ),
                    ExecutionMode::TimeSeries => ModeConfig::TimeSeries(
                        serde_yaml::from_value(value)
                            .map_err(|err| format!("modeConfig for mode {mode}: {err}"))?,
                    ),
                }
            }
        };

        Ok(LoadProfileSpec {
            conns: wire.conns,
            client: wire.client,
            content_type: wire.content_type,
            disable_http2: wire.disable_http2,
            max_retries: wire.max_retries,
            mode_config,
        })
    }
}
