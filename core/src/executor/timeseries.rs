//! Time-series replay executor

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{Error, Result};
use crate::executor::{BuilderReceiver, Executor, ExecutorMetadata, RequestRateLimiter};
use crate::profile::TimeSeriesConfig;
use crate::request::{from_exact, RequestBuilder};

struct TimedBucket {
    start_time: f64,
    builders: Vec<Arc<dyn RequestBuilder>>,
}

/// Replays exact requests at their recorded bucket offsets.
///
/// A bucket's requests are released back-to-back once its start time is
/// reached; pacing comes from the bucket offsets alone, so there is no
/// worker-level rate limiter. A start time already in the past fires
/// immediately.
pub struct TimeSeriesExecutor {
    interval: Duration,
    buckets: Vec<TimedBucket>,
    expected_total: usize,
    tx: async_channel::Sender<Arc<dyn RequestBuilder>>,
    rx: BuilderReceiver,
    cancel: CancellationToken,
    tracker: TaskTracker,
    stopped: AtomicBool,
}

impl TimeSeriesExecutor {
    /// Parse the interval and pre-build every bucket's request builders so
    /// factory problems surface before the run starts.
    pub fn new(config: &TimeSeriesConfig, max_retries: usize) -> Result<Self> {
        let interval = humantime::parse_duration(&config.interval)
            .map_err(|err| Error::Construction(format!("invalid interval: {err}")))?;

        let mut expected_total = 0usize;
        let mut buckets = Vec::with_capacity(config.buckets.len());
        for bucket in &config.buckets {
            let mut builders = Vec::with_capacity(bucket.requests.len());
            for request in &bucket.requests {
                builders.push(from_exact(request, max_retries)?);
            }
            expected_total += builders.len();
            buckets.push(TimedBucket {
                start_time: bucket.start_time,
                builders,
            });
        }

        let (tx, rx) = async_channel::bounded(1);
        Ok(Self {
            interval,
            buckets,
            expected_total,
            tx,
            rx,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            stopped: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Executor for TimeSeriesExecutor {
    fn chan(&self) -> BuilderReceiver {
        self.rx.clone()
    }

    async fn run(&self, ctx: CancellationToken) -> Result<()> {
        self.tracker
            .track_future(async {
                let start = tokio::time::Instant::now();

                for bucket in &self.buckets {
                    let offset =
                        Duration::try_from_secs_f64(bucket.start_time).unwrap_or_default();
                    let target = start + offset;

                    tokio::select! {
                        _ = tokio::time::sleep_until(target) => {}
                        _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                        _ = ctx.cancelled() => return Err(Error::Cancelled),
                    }

                    for builder in &bucket.builders {
                        tokio::select! {
                            sent = self.tx.send(Arc::clone(builder)) => {
                                if sent.is_err() {
                                    return Ok(());
                                }
                            }
                            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                            _ = ctx.cancelled() => return Err(Error::Cancelled),
                        }
                    }
                }

                Ok(())
            })
            .await
    }

    async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.tx.close();
    }

    fn metadata(&self) -> ExecutorMetadata {
        let expected_duration = self
            .buckets
            .last()
            .map(|bucket| Duration::try_from_secs_f64(bucket.start_time).unwrap_or_default())
            .unwrap_or_default();

        let mut custom = HashMap::new();
        custom.insert("mode".to_string(), serde_json::json!("time-series"));
        custom.insert(
            "bucket_count".to_string(),
            serde_json::json!(self.buckets.len()),
        );
        custom.insert(
            "interval".to_string(),
            serde_json::json!(format!("{:?}", self.interval)),
        );

        ExecutorMetadata {
            expected_total: self.expected_total,
            expected_duration,
            custom,
        }
    }

    fn rate_limiter(&self) -> Option<Arc<RequestRateLimiter>> {
        None
    }

    fn execution_context(&self, base: &CancellationToken) -> CancellationToken {
        base.child_token()
    }
}
