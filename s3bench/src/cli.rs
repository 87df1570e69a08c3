use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;
use s3bench_service::backend::{InMemoryBackend, S3CompatibleBackendConfig};
use s3bench_service::{Endpoint, EndpointConfig, EndpointPool, RetryPolicy};
use secrecy::{ExposeSecret, SecretBox};

use crate::config::{Config, ConfigSecret, Logging};
use crate::driver::{BenchmarkDriver, DriverOptions};
use crate::observability;
use crate::timeseries::Reconstructor;

/// Object storage throughput benchmark.
///
/// Writes, reads, stats and removes the given number of objects, printing throughput samples and a
/// summary for each phase on stdout.
#[derive(Debug, FromArgs)]
pub struct BenchArgs {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    /// number of objects to write
    #[argh(positional)]
    pub object_count: usize,

    /// number of concurrent workers per phase
    #[argh(positional)]
    pub thread_count: usize,
}

/// Reports the peak operation rates found in benchmark logs.
#[derive(Debug, FromArgs)]
pub struct AnalyzeArgs {
    /// benchmark output files to merge
    #[argh(positional)]
    pub logs: Vec<PathBuf>,
}

/// Bootstrap the runtime and run the benchmark.
pub fn execute() -> Result<()> {
    let args: BenchArgs = argh::from_env();

    let config = Config::load(args.config.as_deref())?;
    config.validate()?;
    anyhow::ensure!(args.thread_count >= 1, "thread count must be at least 1");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("bench-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config.logging);
    tracing::debug!(?config);

    let pool = build_pool(&config)?;
    let options = DriverOptions {
        object_count: args.object_count,
        threads: args.thread_count,
        payload: config.payload.generator(),
        sample_interval: config.sample_interval,
        read_attempts: config.retry.max_attempts,
    };

    runtime.block_on(async move {
        let mut driver = BenchmarkDriver::new(pool, options);
        driver.run().await.context("benchmark aborted")?;
        tracing::info!("benchmark complete");
        Ok(())
    })
}

/// Builds one endpoint per configured bucket.
///
/// Dry runs get process-local buckets, everything else talks to the configured service.
pub fn build_pool(config: &Config) -> Result<EndpointPool> {
    let endpoints = config
        .buckets()
        .into_iter()
        .map(|bucket| {
            let endpoint_config = if config.dry_run {
                EndpointConfig::InMemory(InMemoryBackend::new("dry-run"))
            } else {
                EndpointConfig::S3Compatible(S3CompatibleBackendConfig {
                    url: config.endpoint_url(),
                    bucket: bucket.to_owned(),
                    region: config.region.clone(),
                    access_key: expose(&config.access_key),
                    secret_key: expose(&config.secret_key),
                    request_timeout: Some(config.request_timeout),
                })
            };
            let retry = RetryPolicy::new(config.retry.max_attempts, config.retry.delay);

            Endpoint::from_config(bucket, endpoint_config, retry)
                .with_context(|| format!("failed to set up bucket {bucket}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(EndpointPool::new(endpoints)?)
}

fn expose(secret: &Option<SecretBox<ConfigSecret>>) -> Option<String> {
    secret
        .as_ref()
        .map(|secret| secret.expose_secret().as_str().to_owned())
}

/// Merge benchmark logs and print the peak rate of every operation.
pub fn analyze() -> Result<()> {
    let args: AnalyzeArgs = argh::from_env();
    anyhow::ensure!(!args.logs.is_empty(), "at least one log file is required");
    observability::init_tracing(&Logging::default());

    let mut reconstructor = Reconstructor::new();
    for path in &args.logs {
        reconstructor
            .ingest_file(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
    }

    println!("{}", reconstructor.finish());
    Ok(())
}
