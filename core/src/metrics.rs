//! Response metrics and report building
//!
//! Workers record one observation per request into a shared
//! [`ResponseMetric`]; the scheduler gathers the accumulated
//! [`ResponseStats`] when the run ends. Report building (percentiles, error
//! grouping) lives here as well so the CLI only does serialisation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RequestError;

/// Latency percentiles reported per URL and overall.
pub const PERCENTILES: [f64; 6] = [0.0, 0.5, 0.9, 0.95, 0.99, 1.0];

/// One failed request observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseError {
    /// Metric key of the request: `{method} {maskedURL}`.
    pub url: String,
    /// When the request finished.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// How long the request took, in seconds.
    pub duration_secs: f64,
    /// Error classification, e.g. `http:429` or `timeout`.
    pub kind: String,
    /// Human-readable error message.
    pub message: String,
}

/// Accumulated per-URL latencies, error records and received bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseStats {
    /// Failed request observations.
    pub errors: Vec<ResponseError>,
    /// Successful request latencies in seconds, keyed by
    /// `{method} {maskedURL}`.
    #[serde(rename = "latenciesByURL")]
    pub latencies_by_url: HashMap<String, Vec<f64>>,
    /// Total bytes received across all requests.
    pub total_received_bytes: u64,
}

/// Thread-safe response metric shared by all workers of a run.
///
/// All observations are serialised by one internal mutex; the scheduler
/// takes the final snapshot with [`ResponseMetric::gather`].
#[derive(Debug, Default)]
pub struct ResponseMetric {
    inner: Mutex<ResponseStats>,
}

impl ResponseMetric {
    /// Create an empty metric.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ResponseStats> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add received bytes; recorded for failed requests too.
    pub fn observe_received_bytes(&self, bytes: u64) {
        self.lock().total_received_bytes += bytes;
    }

    /// Record a successful request latency.
    pub fn observe_latency(&self, method: &str, url: &str, seconds: f64) {
        self.lock()
            .latencies_by_url
            .entry(format!("{method} {url}"))
            .or_default()
            .push(seconds);
    }

    /// Record a failed request.
    pub fn observe_failure(&self, method: &str, url: &str, seconds: f64, err: &RequestError) {
        self.lock().errors.push(ResponseError {
            url: format!("{method} {url}"),
            timestamp: chrono::Utc::now(),
            duration_secs: seconds,
            kind: err.kind(),
            message: err.to_string(),
        });
    }

    /// Snapshot the accumulated stats.
    pub fn gather(&self) -> ResponseStats {
        self.lock().clone()
    }
}

/// Compute `[percentile, value]` pairs for the configured percentiles using
/// the nearest-rank method over a sorted copy of `latencies`.
pub fn build_percentile_latencies(latencies: &[f64]) -> Vec<[f64; 2]> {
    if latencies.is_empty() {
        return PERCENTILES.iter().map(|&p| [p, 0.0]).collect();
    }

    let mut sorted = latencies.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len();
    PERCENTILES
        .iter()
        .map(|&p| {
            let rank = (n as f64 * p).ceil() as usize;
            let idx = rank.saturating_sub(1).min(n - 1);
            [p, sorted[idx]]
        })
        .collect()
}

/// Group error observations by their classification kind.
pub fn build_error_stats(errors: &[ResponseError]) -> HashMap<String, u64> {
    let mut stats = HashMap::new();
    for err in errors {
        *stats.entry(err.kind.clone()).or_insert(0) += 1;
    }
    stats
}

/// Report for a single executed spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerMetricReport {
    /// Expected total of the run; zero for unbounded runs.
    pub total: usize,
    /// Error counts grouped by kind.
    pub error_stats: HashMap<String, u64>,
    /// Wall-clock duration of the run.
    pub duration: String,
    /// Total bytes received.
    pub total_received_bytes: u64,
    /// Overall `[percentile, value]` pairs.
    pub percentile_latencies: Vec<[f64; 2]>,
    /// Per-URL `[percentile, value]` pairs.
    #[serde(rename = "percentileLatenciesByURL")]
    pub percentile_latencies_by_url: HashMap<String, Vec<[f64; 2]>>,
    /// Raw latency vectors; only present with `--raw-data`.
    #[serde(rename = "latenciesByURL", skip_serializing_if = "Option::is_none")]
    pub latencies_by_url: Option<HashMap<String, Vec<f64>>>,
    /// Raw error records; only present with `--raw-data`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ResponseError>>,
}

impl RunnerMetricReport {
    /// Build the report for one spec's gathered stats.
    pub fn build(
        stats: &ResponseStats,
        duration: Duration,
        total: usize,
        include_raw_data: bool,
    ) -> Self {
        let mut all_latencies =
            Vec::with_capacity(stats.latencies_by_url.values().map(Vec::len).sum());
        for latencies in stats.latencies_by_url.values() {
            all_latencies.extend_from_slice(latencies);
        }

        let percentile_latencies_by_url = stats
            .latencies_by_url
            .iter()
            .map(|(url, latencies)| (url.clone(), build_percentile_latencies(latencies)))
            .collect();

        Self {
            total,
            error_stats: build_error_stats(&stats.errors),
            duration: format!("{duration:?}"),
            total_received_bytes: stats.total_received_bytes,
            percentile_latencies: build_percentile_latencies(&all_latencies),
            percentile_latencies_by_url,
            latencies_by_url: include_raw_data.then(|| stats.latencies_by_url.clone()),
            errors: include_raw_data.then(|| stats.errors.clone()),
        }
    }
}

/// Report for a multi-spec run: every spec's report plus the aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSpecRunnerMetricReport {
    /// One report per executed spec, in execution order.
    pub per_spec_results: Vec<RunnerMetricReport>,
    /// Report over the concatenated observations of all specs.
    pub aggregated: RunnerMetricReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentiles_of_uniform_range() {
        let latencies: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let pairs = build_percentile_latencies(&latencies);

        assert_eq!(pairs[0], [0.0, 1.0]);
        assert_eq!(pairs[1], [0.5, 50.0]);
        assert_eq!(pairs[2], [0.9, 90.0]);
        assert_eq!(pairs[3], [0.95, 95.0]);
        assert_eq!(pairs[4], [0.99, 99.0]);
        assert_eq!(pairs[5], [1.0, 100.0]);
    }

    #[test]
    fn test_percentiles_empty() {
        let pairs = build_percentile_latencies(&[]);
        assert_eq!(pairs.len(), PERCENTILES.len());
        assert!(pairs.iter().all(|[_, v]| *v == 0.0));
    }

    #[test]
    fn test_percentiles_single_value() {
        let pairs = build_percentile_latencies(&[0.125]);
        assert!(pairs.iter().all(|[_, v]| *v == 0.125));
    }

    #[test]
    fn test_observe_and_gather() {
        let metric = ResponseMetric::new();
        metric.observe_latency("GET", "http://h/api/v1/pods/p", 0.001);
        metric.observe_latency("GET", "http://h/api/v1/pods/p", 0.002);
        metric.observe_received_bytes(8);
        metric.observe_received_bytes(8);
        metric.observe_failure(
            "DELETE",
            "http://h/api/v1/pods/:name",
            0.5,
            &RequestError::Status { status: 404 },
        );

        let stats = metric.gather();
        assert_eq!(stats.total_received_bytes, 16);
        assert_eq!(
            stats.latencies_by_url["GET http://h/api/v1/pods/p"],
            vec![0.001, 0.002]
        );
        assert_eq!(stats.errors.len(), 1);
        assert_eq!(stats.errors[0].kind, "http:404");
        assert_eq!(stats.errors[0].url, "DELETE http://h/api/v1/pods/:name");
    }

    #[test]
    fn test_error_stats_grouping() {
        let metric = ResponseMetric::new();
        for _ in 0..3 {
            metric.observe_failure("GET", "u", 0.1, &RequestError::Status { status: 429 });
        }
        metric.observe_failure("GET", "u", 0.1, &RequestError::MissingBookmark);

        let stats = build_error_stats(&metric.gather().errors);
        assert_eq!(stats["http:429"], 3);
        assert_eq!(stats["watch"], 1);
    }

    #[test]
    fn test_report_raw_data_flag() {
        let metric = ResponseMetric::new();
        metric.observe_latency("GET", "u", 0.001);
        let stats = metric.gather();

        let plain = RunnerMetricReport::build(&stats, Duration::from_secs(1), 10, false);
        assert!(plain.latencies_by_url.is_none());
        assert!(plain.errors.is_none());
        assert_eq!(plain.total, 10);

        let raw = RunnerMetricReport::build(&stats, Duration::from_secs(1), 10, true);
        assert_eq!(raw.latencies_by_url.unwrap()["GET u"], vec![0.001]);
        assert_eq!(raw.errors.unwrap().len(), 0);
    }

    #[test]
    fn test_report_serialises_expected_keys() {
        let stats = ResponseStats::default();
        let report = RunnerMetricReport::build(&stats, Duration::from_millis(1500), 5, false);
        let json = serde_json::to_value(&report).unwrap();

        assert!(json.get("errorStats").is_some());
        assert!(json.get("totalReceivedBytes").is_some());
        assert!(json.get("percentileLatencies").is_some());
        assert!(json.get("percentileLatenciesByURL").is_some());
        assert!(json.get("latenciesByURL").is_none());
    }
}
