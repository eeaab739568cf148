//! CLI argument parsing and the runner command

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use kubeload_core::metrics::{MultiSpecRunnerMetricReport, RunnerMetricReport};
use kubeload_core::profile::{ContentType, LoadProfile, ModeOverrides, OverrideDefaults};
use kubeload_core::rest::{build_clients, load_kubeconfig, ClientPoolOptions};
use kubeload_core::scheduler::{run_specs, schedule};

/// Default total number of requests, applied when neither the profile nor
/// the flags bound the run.
const DEFAULT_TOTAL: usize = 1000;

/// Run a benchmark against the API server from one endpoint.
#[derive(Parser, Debug)]
#[command(name = "kubeload")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the kubeconfig file (defaults to ~/.kube/config)
    #[arg(long)]
    pub kubeconfig: Option<String>,

    /// Total number of HTTP clients (worker concurrency); overrides the
    /// profile
    #[arg(long)]
    pub client: Option<usize>,

    /// Path to the load profile file
    #[arg(long, required = true)]
    pub config: String,

    /// Total number of long-lived connections; overrides the profile
    #[arg(long)]
    pub conns: Option<usize>,

    /// Response content type (json or protobuf); overrides the profile
    #[arg(long = "content-type")]
    pub content_type: Option<String>,

    /// Maximum requests per second (zero means no limit); overrides the
    /// profile
    #[arg(long)]
    pub rate: Option<f64>,

    /// Total number of requests; overrides the profile
    #[arg(long)]
    pub total: Option<usize>,

    /// User-Agent header
    #[arg(long = "user-agent")]
    pub user_agent: Option<String>,

    /// Disable the HTTP/2 protocol
    #[arg(long = "disable-http2")]
    pub disable_http2: bool,

    /// Retry request after receiving 429 (zero means no retry); overrides
    /// the profile
    #[arg(long = "max-retries")]
    pub max_retries: Option<usize>,

    /// Path to the file which stores results (stdout when unset)
    #[arg(long)]
    pub result: Option<String>,

    /// Include raw latency data and error records in the result
    #[arg(long = "raw-data")]
    pub raw_data: bool,

    /// Duration of the benchmark in seconds; ignored when total is set
    #[arg(long)]
    pub duration: Option<u64>,
}

impl Cli {
    /// Load the profile, build the client pool and execute the run.
    pub async fn run(&self) -> Result<()> {
        let profile = self.load_profile()?;
        let first = &profile.specs[0];

        let access = load_kubeconfig(&self.kubeconfig_path()?)
            .context("failed to load kubeconfig")?;
        let clients = build_clients(
            &access,
            first.conns,
            &ClientPoolOptions {
                user_agent: self.user_agent.clone(),
                content_type: first.content_type,
                disable_http2: first.disable_http2,
            },
        )?;

        let ctx = CancellationToken::new();
        let signal_ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, winding down");
                signal_ctx.cancel();
            }
        });

        let output = if profile.specs.len() == 1 {
            let result = schedule(&ctx, &profile.specs[0], &clients).await?;
            serde_json::to_value(RunnerMetricReport::build(
                &result.stats,
                result.duration,
                result.total,
                self.raw_data,
            ))?
        } else {
            let (per_spec, aggregated) = run_specs(&ctx, &profile.specs, &clients).await?;
            serde_json::to_value(MultiSpecRunnerMetricReport {
                per_spec_results: per_spec
                    .iter()
                    .map(|r| RunnerMetricReport::build(&r.stats, r.duration, r.total, self.raw_data))
                    .collect(),
                aggregated: RunnerMetricReport::build(
                    &aggregated.stats,
                    aggregated.duration,
                    aggregated.total,
                    self.raw_data,
                ),
            })?
        };

        self.write_result(&output)
    }

    /// Load, override and validate the load profile.
    fn load_profile(&self) -> Result<LoadProfile> {
        let data = std::fs::read_to_string(&self.config)
            .with_context(|| format!("failed to read profile {}", self.config))?;
        let mut profile = LoadProfile::from_yaml(&data)
            .with_context(|| format!("failed to parse profile {}", self.config))?;

        if profile.specs.len() > 1 && self.has_overrides() {
            bail!("CLI flag overrides are not allowed when the profile has multiple specs");
        }

        if let [spec] = profile.specs.as_mut_slice() {
            if let Some(conns) = self.conns {
                spec.conns = conns;
            } else if spec.conns == 0 {
                spec.conns = 1;
            }
            if let Some(client) = self.client {
                spec.client = client;
            } else if spec.client == 0 {
                spec.client = 1;
            }
            if let Some(content_type) = &self.content_type {
                spec.content_type = parse_content_type(content_type)?;
            }
            if self.disable_http2 {
                spec.disable_http2 = true;
            }
            if let Some(max_retries) = self.max_retries {
                spec.max_retries = max_retries;
            }
            spec.mode_config.apply_overrides(&ModeOverrides {
                rate: self.rate,
                total: self.total,
                duration: self.duration,
                interval: None,
            })?;
        }

        profile.validate(&OverrideDefaults {
            total: Some(DEFAULT_TOTAL),
        })?;
        Ok(profile)
    }

    /// Whether any profile-overriding flag was given.
    fn has_overrides(&self) -> bool {
        self.rate.is_some()
            || self.conns.is_some()
            || self.client.is_some()
            || self.total.is_some()
            || self.duration.is_some()
            || self.content_type.is_some()
            || self.max_retries.is_some()
            || self.disable_http2
    }

    fn kubeconfig_path(&self) -> Result<String> {
        if let Some(path) = &self.kubeconfig {
            return Ok(path.clone());
        }
        let home = std::env::var("HOME").context("HOME is not set, pass --kubeconfig")?;
        Ok(format!("{home}/.kube/config"))
    }

    /// Write the report as indented JSON to `--result` or stdout.
    fn write_result(&self, output: &serde_json::Value) -> Result<()> {
        match &self.result {
            Some(path) => {
                if let Some(dir) = Path::new(path).parent() {
                    if !dir.as_os_str().is_empty() && !dir.exists() {
                        std::fs::create_dir_all(dir)
                            .with_context(|| format!("failed to ensure output dir {dir:?}"))?;
                    }
                }
                let mut file = std::fs::File::create(path)
                    .with_context(|| format!("failed to create result file {path}"))?;
                serde_json::to_writer_pretty(&mut file, output)?;
                writeln!(file)?;
            }
            None => {
                let stdout = std::io::stdout();
                let mut handle = stdout.lock();
                serde_json::to_writer_pretty(&mut handle, output)?;
                writeln!(handle)?;
            }
        }
        Ok(())
    }
}

fn parse_content_type(value: &str) -> Result<ContentType> {
    match value {
        "json" => Ok(ContentType::Json),
        "protobuf" => Ok(ContentType::Protobuf),
        other => bail!("unsupported content type {other:?} (json or protobuf)"),
    }
}
