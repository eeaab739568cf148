//! Executors turn a load profile into a lazy stream of request builders
//!
//! An executor owns the output channel the scheduler's workers consume from
//! and produces builders at the rate and ordering its mode dictates. The
//! channel is a rendezvous (capacity 1): workers must be receiving before
//! `run` is started, otherwise the producer blocks on the first send.

mod rate_limiter;
mod timeseries;
mod weighted;

pub use rate_limiter::RequestRateLimiter;
pub use timeseries::TimeSeriesExecutor;
pub use weighted::WeightedRandomExecutor;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::profile::{LoadProfileSpec, ModeConfig};
use crate::request::RequestBuilder;

/// Receiving side of an executor's output channel.
pub type BuilderReceiver = async_channel::Receiver<Arc<dyn RequestBuilder>>;

/// Information about an executor's expected behaviour, used for logging and
/// the final report.
#[derive(Debug, Clone, Default)]
pub struct ExecutorMetadata {
    /// Total number of requests expected; zero if unbounded.
    pub expected_total: usize,
    /// Expected duration of execution; zero if unbounded.
    pub expected_duration: Duration,
    /// Mode-specific extras (e.g. rate, bucket count).
    pub custom: HashMap<String, serde_json::Value>,
}

/// Generates requests according to a specific execution mode.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The channel the scheduler's worker pool consumes builders from.
    fn chan(&self) -> BuilderReceiver;

    /// Produce requests until done or either `ctx` or the executor's
    /// internal context is cancelled.
    async fn run(&self, ctx: CancellationToken) -> Result<()>;

    /// Stop producing and close the output channel once `run` has returned.
    /// Idempotent, and safe to call after `run` already returned on its own.
    async fn stop(&self);

    /// Expected totals and mode-specific extras.
    fn metadata(&self) -> ExecutorMetadata;

    /// Worker-level rate limiter; `None` when the mode paces itself.
    fn rate_limiter(&self) -> Option<Arc<RequestRateLimiter>>;

    /// Derive the execution context from `base`, adding mode-specific
    /// deadlines (e.g. a duration bound).
    fn execution_context(&self, base: &CancellationToken) -> CancellationToken;
}

/// Create the executor for a spec's execution mode.
///
/// The request-builder factories are wired in here rather than through any
/// global registration.
pub fn new_executor(spec: &LoadProfileSpec) -> Result<Arc<dyn Executor>> {
    match &spec.mode_config {
        ModeConfig::WeightedRandom(config) => Ok(Arc::new(WeightedRandomExecutor::new(
            config,
            spec.max_retries,
        )?)),
        ModeConfig::TimeSeries(config) => {
            Ok(Arc::new(TimeSeriesExecutor::new(config, spec.max_retries)?))
        }
    }
}
