//! End-to-end scheduler tests against a local HTTP stub server

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use url::Url;

use kubeload_core::profile::{
    ContentType, ExactRequest, GroupVersionResource, LoadProfileSpec, ModeConfig, RequestBucket,
    RequestGet, RequestMethod, RequestPostDel, TimeSeriesConfig, WeightedRandomConfig,
    WeightedRequest, WeightedRequestKind,
};
use kubeload_core::rest::RestClient;
use kubeload_core::scheduler::{run_specs, schedule};

#[derive(Clone, Debug)]
struct RecordedRequest {
    method: String,
    path: String,
    body: String,
    at: Instant,
}

/// Minimal keep-alive HTTP/1.1 server answering every request with an
/// 8-byte body, recording method, path, body and arrival time.
struct StubServer {
    addr: std::net::SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    async fn start() -> Self {
        Self::start_with_429_budget(false).await
    }

    /// When `reject_first` is set the very first request is answered with
    /// 429 + Retry-After: 1.
    async fn start_with_429_budget(reject_first: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests: Arc<Mutex<Vec<RecordedRequest>>> = Arc::new(Mutex::new(Vec::new()));
        let reject = Arc::new(AtomicBool::new(reject_first));

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                let recorded = Arc::clone(&recorded);
                let reject = Arc::clone(&reject);
                tokio::spawn(async move {
                    serve_connection(socket, recorded, reject).await;
                });
            }
        });

        Self { addr, requests }
    }

    fn client(&self) -> RestClient {
        RestClient::new(Url::parse(&format!("http://{}", self.addr)).unwrap()).unwrap()
    }

    fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve_connection(
    mut socket: tokio::net::TcpStream,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
    reject: Arc<AtomicBool>,
) {
    let mut buf: Vec<u8> = Vec::new();
    let mut tmp = [0u8; 4096];

    loop {
        let head_end = loop {
            if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
                break pos + 4;
            }
            match socket.read(&mut tmp).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&tmp[..n]),
            }
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let mut parts = head.lines().next().unwrap_or_default().split_whitespace();
        let method = parts.next().unwrap_or_default().to_string();
        let path = parts.next().unwrap_or_default().to_string();

        let content_length = head
            .lines()
            .find_map(|line| {
                line.to_ascii_lowercase()
                    .strip_prefix("content-length:")
                    .map(|v| v.trim().parse::<usize>().unwrap_or(0))
            })
            .unwrap_or(0);

        while buf.len() < head_end + content_length {
            match socket.read(&mut tmp).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&tmp[..n]),
            }
        }
        let body = String::from_utf8_lossy(&buf[head_end..head_end + content_length]).to_string();
        buf.drain(..head_end + content_length);

        recorded.lock().unwrap().push(RecordedRequest {
            method,
            path,
            body,
            at: Instant::now(),
        });

        let response: &[u8] = if reject.swap(false, Ordering::SeqCst) {
            b"HTTP/1.1 429 Too Many Requests\r\nRetry-After: 1\r\nContent-Length: 0\r\n\r\n"
        } else {
            b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 8\r\n\r\nabcdefgh"
        };
        if socket.write_all(response).await.is_err() {
            return;
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn pods_gvr() -> GroupVersionResource {
    GroupVersionResource {
        group: String::new(),
        version: "v1".to_string(),
        resource: "pods".to_string(),
    }
}

fn quorum_get(name: &str, shares: u32) -> WeightedRequest {
    WeightedRequest {
        shares,
        kind: WeightedRequestKind::QuorumGet(RequestGet {
            gvr: pods_gvr(),
            namespace: "default".to_string(),
            name: name.to_string(),
        }),
    }
}

fn weighted_spec(rate: f64, total: usize, requests: Vec<WeightedRequest>) -> LoadProfileSpec {
    LoadProfileSpec {
        conns: 1,
        client: 1,
        content_type: ContentType::Json,
        disable_http2: true,
        max_retries: 0,
        mode_config: ModeConfig::WeightedRandom(WeightedRandomConfig {
            rate,
            total,
            duration: 0,
            requests,
        }),
    }
}

#[tokio::test]
async fn weighted_small_run() {
    let server = StubServer::start().await;
    let spec = weighted_spec(0.0, 10, vec![quorum_get("p", 1)]);

    let result = schedule(&CancellationToken::new(), &spec, &[server.client()])
        .await
        .unwrap();

    assert_eq!(result.total, 10);
    assert!(result.stats.errors.is_empty(), "{:?}", result.stats.errors);
    assert_eq!(result.stats.total_received_bytes, 80);

    let latencies: usize = result.stats.latencies_by_url.values().map(Vec::len).sum();
    assert_eq!(latencies, 10);
    for all in result.stats.latencies_by_url.values() {
        for latency in all {
            assert!(*latency < 1.0, "latency unexpectedly high: {latency}");
        }
    }

    assert_eq!(server.recorded().len(), 10);
}

#[tokio::test]
async fn weighted_run_honours_rate_cap() {
    let server = StubServer::start().await;
    let mut spec = weighted_spec(50.0, 100, vec![quorum_get("p", 1)]);
    spec.client = 4;
    spec.conns = 2;

    let result = schedule(&CancellationToken::new(), &spec, &[server.client()])
        .await
        .unwrap();

    // 100 requests at 50 rps need at least ~2 seconds of wall clock.
    assert!(
        result.duration >= Duration::from_millis(1800),
        "run finished too fast: {:?}",
        result.duration
    );

    // A worker already waiting on the limiter when the run completes may
    // drop its last builder, so observed <= expected.
    let recorded = server.recorded().len();
    assert!(
        (95..=100).contains(&recorded),
        "unexpected request count: {recorded}"
    );
}

#[tokio::test]
async fn time_series_buckets_fire_in_order() {
    let server = StubServer::start().await;
    let spec = LoadProfileSpec {
        conns: 1,
        client: 2,
        content_type: ContentType::Json,
        disable_http2: true,
        max_retries: 0,
        mode_config: ModeConfig::TimeSeries(TimeSeriesConfig {
            interval: "1s".to_string(),
            buckets: vec![
                RequestBucket {
                    start_time: 0.0,
                    requests: vec![
                        ExactRequest {
                            method: RequestMethod::Get,
                            gvr: pods_gvr(),
                            namespace: "default".to_string(),
                            name: "p1".to_string(),
                            ..Default::default()
                        },
                        ExactRequest {
                            method: RequestMethod::List,
                            gvr: GroupVersionResource {
                                group: String::new(),
                                version: "v1".to_string(),
                                resource: "configmaps".to_string(),
                            },
                            namespace: "default".to_string(),
                            ..Default::default()
                        },
                    ],
                },
                RequestBucket {
                    start_time: 1.0,
                    requests: vec![ExactRequest {
                        method: RequestMethod::Post,
                        gvr: GroupVersionResource {
                            group: String::new(),
                            version: "v1".to_string(),
                            resource: "configmaps".to_string(),
                        },
                        namespace: "default".to_string(),
                        name: "cm-1".to_string(),
                        ..Default::default()
                    }],
                },
            ],
        }),
    };

    let result = schedule(&CancellationToken::new(), &spec, &[server.client()])
        .await
        .unwrap();
    assert_eq!(result.total, 3);
    assert!(result.stats.errors.is_empty(), "{:?}", result.stats.errors);

    let recorded = server.recorded();
    assert_eq!(recorded.len(), 3);

    let first = recorded.iter().map(|r| r.at).min().unwrap();
    let post = recorded.iter().find(|r| r.method == "POST").unwrap();
    assert!(
        post.at.duration_since(first) >= Duration::from_millis(950),
        "bucket-2 request dispatched too early"
    );
}

#[tokio::test]
async fn post_del_churn_deletes_only_created_names() {
    let server = StubServer::start().await;
    let spec = {
        let mut spec = weighted_spec(
            0.0,
            1000,
            vec![WeightedRequest {
                shares: 1,
                kind: WeightedRequestKind::PostDel(RequestPostDel {
                    gvr: GroupVersionResource {
                        group: String::new(),
                        version: "v1".to_string(),
                        resource: "configmaps".to_string(),
                    },
                    namespace: "default".to_string(),
                    delete_ratio: 0.3,
                }),
            }],
        );
        spec.client = 4;
        spec
    };

    let result = schedule(&CancellationToken::new(), &spec, &[server.client()])
        .await
        .unwrap();
    assert!(result.stats.errors.is_empty(), "{:?}", result.stats.errors);

    let recorded = server.recorded();
    assert_eq!(recorded.len(), 1000);

    let mut posted: HashSet<String> = HashSet::new();
    let mut deleted: HashSet<String> = HashSet::new();
    let mut deletes = 0usize;
    for request in &recorded {
        match request.method.as_str() {
            "POST" => {
                let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
                posted.insert(body["metadata"]["name"].as_str().unwrap().to_string());
            }
            "DELETE" => {
                deletes += 1;
                let name = request.path.rsplit('/').next().unwrap().to_string();
                assert!(
                    posted.contains(&name),
                    "DELETE for a name never created: {name}"
                );
                assert!(deleted.insert(name), "name deleted twice");
            }
            other => panic!("unexpected method {other}"),
        }
    }

    // Expected deletes ~ Binomial(1000, 0.3), minus the rare empty-cache
    // fallbacks at the start of the run.
    assert!(
        (200..=380).contains(&deletes),
        "delete count outside tolerance: {deletes}"
    );
}

#[tokio::test]
async fn cancellation_stops_an_unbounded_run() {
    let server = StubServer::start().await;
    // total == 0 and duration == 0: only cancellation stops this run.
    let spec = weighted_spec(0.0, 0, vec![quorum_get("p", 1)]);

    let ctx = CancellationToken::new();
    let canceller = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            ctx.cancel();
        })
    };

    let started = Instant::now();
    let result = schedule(&ctx, &spec, &[server.client()]).await.unwrap();
    canceller.await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(result.total, 0, "unbounded run reports expected total 0");
    let observed: usize = result.stats.latencies_by_url.values().map(Vec::len).sum();
    assert!(observed > 0, "partial stats should have been gathered");
}

#[tokio::test]
async fn retry_after_429_is_transparent() {
    let server = StubServer::start_with_429_budget(true).await;
    let mut spec = weighted_spec(0.0, 2, vec![quorum_get("p", 1)]);
    spec.max_retries = 1;

    let result = schedule(&CancellationToken::new(), &spec, &[server.client()])
        .await
        .unwrap();

    assert!(result.stats.errors.is_empty(), "{:?}", result.stats.errors);
    let observed: usize = result.stats.latencies_by_url.values().map(Vec::len).sum();
    assert_eq!(observed, 2);
    // Two successes plus the retried 429.
    assert_eq!(server.recorded().len(), 3);
}

#[tokio::test]
async fn multi_spec_results_are_aggregated() {
    let server = StubServer::start().await;
    let specs = vec![
        weighted_spec(0.0, 5, vec![quorum_get("a", 1)]),
        weighted_spec(0.0, 7, vec![quorum_get("b", 1)]),
    ];

    let (per_spec, aggregated) = run_specs(&CancellationToken::new(), &specs, &[server.client()])
        .await
        .unwrap();

    assert_eq!(per_spec.len(), 2);
    assert_eq!(per_spec[0].total, 5);
    assert_eq!(per_spec[1].total, 7);
    assert_eq!(aggregated.total, 12);
    assert_eq!(aggregated.stats.total_received_bytes, 12 * 8);
    assert_eq!(
        aggregated.duration,
        per_spec[0].duration + per_spec[1].duration
    );

    let urls: Vec<&String> = aggregated.stats.latencies_by_url.keys().collect();
    assert_eq!(urls.len(), 2, "per-URL vectors are kept apart: {urls:?}");
}
