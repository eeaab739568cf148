//! Weighted-random executor

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{Error, Result};
use crate::executor::{BuilderReceiver, Executor, ExecutorMetadata, RequestRateLimiter};
use crate::profile::WeightedRandomConfig;
use crate::request::{from_weighted, RequestBuilder};

/// Produces request builders drawn randomly from a weighted distribution,
/// until an optional total is reached or the execution context expires.
pub struct WeightedRandomExecutor {
    rate: f64,
    total: usize,
    duration_secs: u64,
    shares: Vec<u64>,
    shares_sum: u64,
    builders: Vec<Arc<dyn RequestBuilder>>,
    limiter: Arc<RequestRateLimiter>,
    tx: async_channel::Sender<Arc<dyn RequestBuilder>>,
    rx: BuilderReceiver,
    cancel: CancellationToken,
    tracker: TaskTracker,
    stopped: AtomicBool,
}

impl WeightedRandomExecutor {
    /// Build the parallel share/builder vectors and the token bucket.
    pub fn new(config: &WeightedRandomConfig, max_retries: usize) -> Result<Self> {
        let mut shares = Vec::with_capacity(config.requests.len());
        let mut builders = Vec::with_capacity(config.requests.len());
        for request in &config.requests {
            shares.push(u64::from(request.shares));
            builders.push(from_weighted(request, max_retries)?);
        }

        let shares_sum: u64 = shares.iter().sum();
        if shares_sum == 0 {
            return Err(Error::Construction(
                "weighted-random requires at least one request with positive shares".to_string(),
            ));
        }

        let (tx, rx) = async_channel::bounded(1);
        Ok(Self {
            rate: config.rate,
            total: config.total,
            duration_secs: config.duration,
            shares,
            shares_sum,
            builders,
            limiter: Arc::new(RequestRateLimiter::new(config.rate)),
            tx,
            rx,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            stopped: AtomicBool::new(false),
        })
    }

    /// Weighted random selection: draw in `[0, sum(shares))` and walk the
    /// share list subtracting until the draw is covered.
    fn random_pick(&self) -> Arc<dyn RequestBuilder> {
        let mut draw = OsRng.gen_range(0..self.shares_sum);
        for (idx, &share) in self.shares.iter().enumerate() {
            if draw < share {
                return Arc::clone(&self.builders[idx]);
            }
            draw -= share;
        }
        unreachable!("draw is bounded by the share sum")
    }
}

#[async_trait]
impl Executor for WeightedRandomExecutor {
    fn chan(&self) -> BuilderReceiver {
        self.rx.clone()
    }

    async fn run(&self, ctx: CancellationToken) -> Result<()> {
        self.tracker
            .track_future(async {
                let mut sum = 0usize;
                loop {
                    if self.total > 0 && sum >= self.total {
                        break;
                    }

                    let builder = self.random_pick();
                    tokio::select! {
                        sent = self.tx.send(builder) => {
                            if sent.is_err() {
                                // Channel closed underneath us by stop().
                                break;
                            }
                            sum += 1;
                        }
                        _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                        _ = ctx.cancelled() => return Err(Error::Cancelled),
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
        let mut custom = HashMap::new();
        custom.insert("mode".to_string(), serde_json::json!("weighted-random"));
        custom.insert("rate".to_string(), serde_json::json!(self.rate));
        custom.insert(
            "request_types".to_string(),
            serde_json::json!(self.builders.len()),
        );

        ExecutorMetadata {
            expected_total: self.total,
            expected_duration: Duration::from_secs(self.duration_secs),
            custom,
        }
    }

    fn rate_limiter(&self) -> Option<Arc<RequestRateLimiter>> {
        Some(Arc::clone(&self.limiter))
    }

    fn execution_context(&self, base: &CancellationToken) -> CancellationToken {
        let child = base.child_token();
        if self.duration_secs > 0 {
            let deadline = Duration::from_secs(self.duration_secs);
            let token = child.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(deadline) => token.cancel(),
                    _ = token.cancelled() => {}
                }
            });
        }
        child
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{
        GroupVersionResource, RequestGet, WeightedRequest, WeightedRequestKind,
    };
    use crate::rest::RestClient;
    use url::Url;

    fn get_request(name: &str, shares: u32) -> WeightedRequest {
        WeightedRequest {
            shares,
            kind: WeightedRequestKind::QuorumGet(RequestGet {
                gvr: GroupVersionResource {
                    group: String::new(),
                    version: "v1".to_string(),
                    resource: "pods".to_string(),
                },
                namespace: "default".to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn config(total: usize, requests: Vec<WeightedRequest>) -> WeightedRandomConfig {
        WeightedRandomConfig {
            rate: 0.0,
            total,
            duration: 0,
            requests,
        }
    }

    fn client() -> RestClient {
        RestClient::new(Url::parse("http://127.0.0.1:6443").unwrap()).unwrap()
    }

    #[test]
    fn test_zero_shares_rejected() {
        let config = config(10, vec![get_request("a", 0)]);
        assert!(WeightedRandomExecutor::new(&config, 0).is_err());
    }

    #[test]
    fn test_metadata() {
        let mut config = config(500, vec![get_request("a", 1), get_request("b", 2)]);
        config.rate = 20.0;
        config.duration = 0;
        let exec = WeightedRandomExecutor::new(&config, 0).unwrap();

        let metadata = exec.metadata();
        assert_eq!(metadata.expected_total, 500);
        assert_eq!(metadata.expected_duration, Duration::ZERO);
        assert_eq!(metadata.custom["rate"], serde_json::json!(20.0));
        assert_eq!(metadata.custom["request_types"], serde_json::json!(2));
    }

    #[tokio::test]
    async fn test_run_produces_exactly_total() {
        let exec = Arc::new(
            WeightedRandomExecutor::new(&config(25, vec![get_request("a", 1)]), 0).unwrap(),
        );
        let rx = exec.chan();

        let producer = {
            let exec = Arc::clone(&exec);
            tokio::spawn(async move { exec.run(CancellationToken::new()).await })
        };

        let mut received = 0usize;
        while received < 25 {
            rx.recv().await.unwrap();
            received += 1;
        }

        producer.await.unwrap().unwrap();
        exec.stop().await;
        assert!(rx.recv().await.is_err(), "channel closed after stop");
    }

    #[tokio::test]
    async fn test_weighted_frequency_converges() {
        let requests = vec![get_request("pa", 1), get_request("pb", 3)];
        let total = 2000usize;
        let exec = Arc::new(WeightedRandomExecutor::new(&config(total, requests), 0).unwrap());
        let rx = exec.chan();

        let producer = {
            let exec = Arc::clone(&exec);
            tokio::spawn(async move { exec.run(CancellationToken::new()).await })
        };

        let client = client();
        let mut count_a = 0usize;
        for _ in 0..total {
            let builder = rx.recv().await.unwrap();
            if builder.build(&client).url().path().ends_with("/pa") {
                count_a += 1;
            }
        }
        producer.await.unwrap().unwrap();
        exec.stop().await;

        // Expected frequency 1/4; with N=2000 the observed value stays well
        // within +-0.05 except with negligible probability.
        let freq = count_a as f64 / total as f64;
        assert!((freq - 0.25).abs() < 0.05, "frequency off: {freq}");
    }

    #[tokio::test]
    async fn test_run_stops_on_cancelled_context() {
        let exec = Arc::new(
            WeightedRandomExecutor::new(&config(0, vec![get_request("a", 1)]), 0).unwrap(),
        );
        let ctx = CancellationToken::new();
        ctx.cancel();

        let err = exec.run(ctx).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let exec = Arc::new(
            WeightedRandomExecutor::new(&config(1, vec![get_request("a", 1)]), 0).unwrap(),
        );
        let rx = exec.chan();

        let producer = {
            let exec = Arc::clone(&exec);
            tokio::spawn(async move { exec.run(CancellationToken::new()).await })
        };
        rx.recv().await.unwrap();
        producer.await.unwrap().unwrap();

        exec.stop().await;
        exec.stop().await;
        assert!(rx.recv().await.is_err());
    }

    #[tokio::test]
    async fn test_unbounded_run_respects_duration_context() {
        let mut cfg = config(0, vec![get_request("a", 1)]);
        cfg.duration = 1;
        let exec = Arc::new(WeightedRandomExecutor::new(&cfg, 0).unwrap());
        let rx = exec.chan();

        let base = CancellationToken::new();
        let exec_ctx = exec.execution_context(&base);
        let producer = {
            let exec = Arc::clone(&exec);
            tokio::spawn(async move { exec.run(exec_ctx).await })
        };

        // Drain in the background until stop() closes the channel.
        let drainer = {
            let rx = rx.clone();
            tokio::spawn(async move { while rx.recv().await.is_ok() {} })
        };

        let result = tokio::time::timeout(Duration::from_secs(5), producer)
            .await
            .expect("producer should stop at the duration deadline")
            .unwrap();
        assert!(result.unwrap_err().is_cancelled());

        exec.stop().await;
        drainer.await.unwrap();
    }
}
