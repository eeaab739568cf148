//! Scheduler: a worker pool consuming an executor's request stream
//!
//! The scheduler wires one executor to `client` workers (falling back to
//! `conns` when unset), applies the executor's rate limiter, executes each
//! built request and records per-URL latency, bytes and error metrics.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::executor::new_executor;
use crate::metrics::{ResponseMetric, ResponseStats};
use crate::profile::LoadProfileSpec;
use crate::rest::RestClient;

/// Fixed timeout applied to every individual request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome of one scheduled spec.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    /// Accumulated response statistics.
    pub stats: ResponseStats,
    /// Wall-clock duration of the run.
    pub duration: Duration,
    /// Expected total from the executor's metadata; zero for unbounded
    /// runs.
    pub total: usize,
}

/// Execute one spec against the client pool until the executor finishes or
/// `ctx` is cancelled.
pub async fn schedule(
    ctx: &CancellationToken,
    spec: &LoadProfileSpec,
    clients: &[RestClient],
) -> Result<RunResult> {
    if clients.is_empty() {
        return Err(Error::Client(
            "at least one REST client is required".to_string(),
        ));
    }

    let ctx = ctx.child_token();
    let exec = new_executor(spec)?;
    let metadata = exec.metadata();
    let exec_ctx = exec.execution_context(&ctx);
    let limiter = exec.rate_limiter();

    let workers = if spec.client == 0 { spec.conns } else { spec.client };

    let metric = Arc::new(ResponseMetric::new());
    let rx = exec.chan();

    let mut worker_handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        let client = clients[worker_id % clients.len()].clone();
        let rx = rx.clone();
        let limiter = limiter.clone();
        let metric = Arc::clone(&metric);
        let worker_ctx = ctx.clone();

        worker_handles.push(tokio::spawn(async move {
            tracing::debug!(worker_id, "worker started, waiting for requests");
            let mut request_count = 0usize;

            while let Ok(builder) = rx.recv().await {
                if let Some(limiter) = &limiter {
                    if limiter.wait(&worker_ctx).await.is_err() {
                        tracing::debug!(worker_id, "rate limiter wait interrupted");
                        return;
                    }
                }

                request_count += 1;
                let mut request = builder.build(&client);
                request.set_timeout(DEFAULT_REQUEST_TIMEOUT);

                let method = request.method();
                let masked_url = request.masked_url().to_string();

                let start = Instant::now();
                // The request runs under its own deadline, not the scheduler
                // context: an in-flight request finishes (or times out) even
                // while the run winds down.
                let (bytes, outcome) = request.issue().await;
                let latency = start.elapsed().as_secs_f64();

                metric.observe_received_bytes(bytes);
                match outcome {
                    // A RST_STREAM(NO_ERROR) after a complete response is a
                    // success per RFC 7540 section 8.1.
                    Err(err) if !err.is_http2_stream_no_error() => {
                        tracing::debug!(worker_id, error = %err, "request failed");
                        metric.observe_failure(method, &masked_url, latency, &err);
                    }
                    _ => metric.observe_latency(method, &masked_url, latency),
                }
            }

            tracing::debug!(worker_id, requests = request_count, "worker finished");
        }));
    }

    tracing::info!(
        mode = %spec.mode(),
        workers,
        connections = clients.len(),
        rate = ?metadata.custom.get("rate"),
        expected_total = metadata.expected_total,
        expected_duration_secs = metadata.expected_duration.as_secs(),
        http2 = !spec.disable_http2,
        content_type = %spec.content_type,
        "schedule started"
    );

    let start = Instant::now();

    // Start the executor only now that workers are receiving: the rendezvous
    // channel would deadlock the producer otherwise.
    let run_handle = {
        let exec = Arc::clone(&exec);
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(err) = exec.run(exec_ctx).await {
                if !err.is_cancelled() {
                    tracing::error!(error = %err, "executor error");
                }
            }
            // Signal completion (success or failure).
            ctx.cancel();
        })
    };

    ctx.cancelled().await;

    exec.stop().await;
    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = run_handle.await;

    let duration = start.elapsed();
    Ok(RunResult {
        stats: metric.gather(),
        duration,
        total: metadata.expected_total,
    })
}

/// Run multiple specs strictly sequentially over a shared client pool,
/// returning the per-spec results and their aggregate.
pub async fn run_specs(
    ctx: &CancellationToken,
    specs: &[LoadProfileSpec],
    clients: &[RestClient],
) -> Result<(Vec<RunResult>, RunResult)> {
    if specs.is_empty() {
        return Err(Error::Validation("no specs to execute".to_string()));
    }

    let mut results = Vec::with_capacity(specs.len());
    for (idx, spec) in specs.iter().enumerate() {
        tracing::info!(spec = idx + 1, of = specs.len(), "executing spec");
        results.push(schedule(ctx, spec, clients).await?);
    }

    let aggregated = aggregate_results(&results);
    Ok((results, aggregated))
}

/// Concatenate per-URL latency vectors, sum bytes and totals, append error
/// records; the aggregate duration is the sum of per-spec durations.
pub fn aggregate_results(results: &[RunResult]) -> RunResult {
    let mut aggregated = RunResult::default();
    for result in results {
        aggregated
            .stats
            .errors
            .extend(result.stats.errors.iter().cloned());
        for (url, latencies) in &result.stats.latencies_by_url {
            aggregated
                .stats
                .latencies_by_url
                .entry(url.clone())
                .or_default()
                .extend_from_slice(latencies);
        }
        aggregated.stats.total_received_bytes += result.stats.total_received_bytes;
        aggregated.total += result.total;
        aggregated.duration += result.duration;
    }
    aggregated
}
