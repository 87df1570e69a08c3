//! Orchestration of the four benchmark phases.
//!
//! A [`BenchmarkDriver`] runs Write, Read, Stat and Remove strictly one after another. Each phase
//! spawns a fixed number of workers that pull sequence ids from a shared countdown until no work
//! is left, while a [`LiveSampler`] prints per-second throughput. The first failing worker aborts
//! its siblings and the run.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::TryStreamExt;
use s3bench_service::{Endpoint, EndpointId, EndpointPool};
use sketches_ddsketch::DDSketch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::operation::OperationKind;
use crate::registry::{ObjectRecord, ObjectRegistry};
use crate::sampler::{LiveSampler, WorkerCounters, format_mb};
use crate::workload::PayloadGenerator;

/// Receives every sample, announcement and summary line.
pub type Output = Arc<dyn Fn(&str) + Send + Sync>;

/// An [`Output`] printing to stdout.
pub fn stdout() -> Output {
    Arc::new(|line| println!("{line}"))
}

/// Where a [`BenchmarkDriver`] is in its run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    /// No phase has run yet.
    Idle,
    /// The write phase is running.
    Writing,
    /// The read phase is running.
    Reading,
    /// The stat phase is running.
    Stating,
    /// The remove phase is running.
    Removing,
    /// All phases completed.
    Done,
}

impl DriverState {
    fn running(operation: OperationKind) -> Self {
        match operation {
            OperationKind::Write => DriverState::Writing,
            OperationKind::Read => DriverState::Reading,
            OperationKind::Stat => DriverState::Stating,
            OperationKind::Remove => DriverState::Removing,
        }
    }
}

/// Parameters of a benchmark run.
#[derive(Clone, Debug)]
pub struct DriverOptions {
    /// Objects written, and later read, stated and removed.
    pub object_count: usize,
    /// Concurrent workers per phase.
    pub threads: usize,
    /// Generator of keys and payloads for the write phase.
    pub payload: PayloadGenerator,
    /// Period of live samples.
    pub sample_interval: Duration,
    /// Attempts of the get-and-drain loop of the read phase.
    pub read_attempts: u32,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            object_count: 0,
            threads: 1,
            payload: PayloadGenerator::default(),
            sample_interval: Duration::from_secs(1),
            read_attempts: s3bench_service::retry::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// The outcome of a completed phase.
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseSummary {
    /// The phase.
    pub operation: OperationKind,
    /// Wall time from the first worker start to the last worker finish.
    pub elapsed: Duration,
    /// The highest sampled operation rate.
    pub peak_ops_per_sec: f64,
    /// Objects processed per second over the whole phase.
    pub avg_ops_per_sec: f64,
    /// Bytes moved by all workers.
    pub total_bytes: u64,
    /// Retries performed by all endpoints during the phase.
    pub recoverable_errors: u64,
}

impl fmt::Display for PhaseSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} took {}ms. Peak ops {:.1}/s Avg ops {:.1}/s Total size {}MB Recoverable errors {}",
            self.operation,
            self.elapsed.as_millis(),
            self.peak_ops_per_sec,
            self.avg_ops_per_sec,
            format_mb(self.total_bytes as f64),
            self.recoverable_errors
        )
    }
}

/// Runs the benchmark phases against an [`EndpointPool`].
pub struct BenchmarkDriver {
    pool: EndpointPool,
    options: DriverOptions,
    registry: Arc<ObjectRegistry>,
    state: DriverState,
    aborted: bool,
    output: Output,
}

impl fmt::Debug for BenchmarkDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchmarkDriver")
            .field("pool", &self.pool)
            .field("options", &self.options)
            .field("registry", &self.registry)
            .field("state", &self.state)
            .field("aborted", &self.aborted)
            .finish_non_exhaustive()
    }
}

impl BenchmarkDriver {
    /// Creates a driver printing its results to stdout.
    pub fn new(pool: EndpointPool, options: DriverOptions) -> Self {
        let registry = Arc::new(ObjectRegistry::new(options.object_count));
        Self {
            pool,
            options,
            registry,
            state: DriverState::Idle,
            aborted: false,
            output: stdout(),
        }
    }

    /// Sends result lines to `output` instead of stdout.
    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    /// The current state of the run.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// The objects recorded by the write phase.
    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    /// The endpoints the benchmark runs against.
    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    /// Whether a phase failed. A failed run cannot be resumed.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// The phase due next, if any.
    pub fn next_phase(&self) -> Option<OperationKind> {
        if self.aborted {
            return None;
        }

        match self.state {
            DriverState::Idle => Some(OperationKind::Write),
            DriverState::Writing => Some(OperationKind::Read),
            DriverState::Reading => Some(OperationKind::Stat),
            DriverState::Stating => Some(OperationKind::Remove),
            DriverState::Removing | DriverState::Done => None,
        }
    }

    /// Runs all remaining phases in order.
    pub async fn run(&mut self) -> Result<Vec<PhaseSummary>> {
        let mut summaries = Vec::with_capacity(OperationKind::ALL.len());
        while let Some(operation) = self.next_phase() {
            summaries.push(self.run_phase(operation).await?);
        }
        Ok(summaries)
    }

    /// Runs a single phase, which must be the one due next.
    pub async fn run_phase(&mut self, operation: OperationKind) -> Result<PhaseSummary> {
        let expected = self.next_phase();
        if expected != Some(operation) {
            return Err(Error::PhaseOrder {
                expected,
                requested: operation,
            });
        }

        let threads = self.options.threads.max(1);
        (self.output)(&format!(
            "{operation}: scheduling for {} objects in {threads} threads and {} buckets",
            self.options.object_count,
            self.pool.len(),
        ));

        self.state = DriverState::running(operation);
        let result = self.execute(operation, threads).await;
        if result.is_err() {
            self.aborted = true;
        }
        result
    }

    async fn execute(&mut self, operation: OperationKind, threads: usize) -> Result<PhaseSummary> {
        let phase = Arc::new(Phase {
            operation,
            pool: self.pool.clone(),
            registry: self.registry.clone(),
            counters: Arc::new(WorkerCounters::new(threads)),
            countdown: AtomicUsize::new(self.options.object_count),
            payload: self.options.payload.clone(),
            read_attempts: self.options.read_attempts.max(1),
        });

        self.pool.reset_retries();
        let cancel = CancellationToken::new();
        let sampler = LiveSampler::new(
            operation,
            phase.counters.clone(),
            self.options.sample_interval,
        );
        let sampler = sampler.spawn(cancel.clone(), {
            let output = self.output.clone();
            move |sample| output(&sample.to_string())
        });

        let start = Instant::now();
        let result = run_workers(&phase, threads).await;
        let elapsed = start.elapsed();
        cancel.cancel();
        let peak_ops_per_sec = sampler.await?;
        let latencies = result?;

        if operation == OperationKind::Write {
            self.registry.ensure_complete()?;
        }

        let (count, total_bytes) = phase.counters.totals();
        let summary = PhaseSummary {
            operation,
            elapsed,
            peak_ops_per_sec,
            avg_ops_per_sec: average(self.options.object_count, elapsed),
            total_bytes,
            recoverable_errors: self.pool.total_retries(),
        };
        (self.output)(&summary.to_string());
        self.pool.reset_retries();
        log_latencies(operation, count, &latencies);

        if operation.next().is_none() {
            self.state = DriverState::Done;
        }
        Ok(summary)
    }
}

fn average(object_count: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        object_count as f64 / secs
    } else {
        0.0
    }
}

fn log_latencies(operation: OperationKind, count: u64, latencies: &DDSketch) {
    let quantile = |q| {
        latencies
            .quantile(q)
            .ok()
            .flatten()
            .map(Duration::from_secs_f64)
    };
    tracing::info!(
        %operation,
        count,
        p50 = ?quantile(0.5),
        p90 = ?quantile(0.9),
        p99 = ?quantile(0.99),
        "phase latencies"
    );
}

/// State shared by all workers of one phase.
struct Phase {
    operation: OperationKind,
    pool: EndpointPool,
    registry: Arc<ObjectRegistry>,
    counters: Arc<WorkerCounters>,
    countdown: AtomicUsize,
    payload: PayloadGenerator,
    read_attempts: u32,
}

impl Phase {
    /// Claims the next unit of work, counting down from the object count.
    fn claim(&self) -> Option<usize> {
        self.countdown
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .ok()
            .map(|previous| previous - 1)
    }
}

async fn run_workers(phase: &Arc<Phase>, threads: usize) -> Result<DDSketch> {
    let mut workers = JoinSet::new();
    for worker_id in 0..threads {
        workers.spawn(run_worker(phase.clone(), worker_id));
    }

    let mut latencies = DDSketch::default();
    while let Some(joined) = workers.join_next().await {
        let worker = match joined {
            Ok(Ok(worker)) => worker,
            Ok(Err(error)) => {
                workers.abort_all();
                return Err(error);
            }
            Err(error) => {
                workers.abort_all();
                return Err(error.into());
            }
        };
        if let Err(error) = latencies.merge(&worker) {
            tracing::warn!(?error, "failed to merge worker latencies");
        }
    }

    Ok(latencies)
}

async fn run_worker(phase: Arc<Phase>, worker_id: usize) -> Result<DDSketch> {
    let endpoint_id = phase.pool.route(worker_id);
    let mut rng = phase.payload.rng();
    let mut latencies = DDSketch::default();
    let slot = phase.counters.slot(worker_id);

    while let Some(sequence_id) = phase.claim() {
        let start = Instant::now();
        let size = match phase.operation {
            OperationKind::Write => {
                let key = phase.payload.key(&mut rng);
                let contents = phase.payload.payload(&mut rng);
                write_object(&phase, endpoint_id, sequence_id, key, contents).await?
            }
            OperationKind::Read => read_object(&phase, sequence_id).await?,
            OperationKind::Stat => stat_object(&phase, sequence_id).await?,
            OperationKind::Remove => remove_object(&phase, sequence_id).await?,
        };
        latencies.add(start.elapsed().as_secs_f64());
        slot.record(size);
    }

    tracing::debug!(
        operation = %phase.operation,
        worker_id,
        endpoint = %endpoint_id,
        "worker done"
    );
    Ok(latencies)
}

async fn write_object(
    phase: &Phase,
    endpoint_id: EndpointId,
    sequence_id: usize,
    key: String,
    contents: bytes::Bytes,
) -> Result<u64> {
    let endpoint = phase.pool.get(endpoint_id);
    let put = endpoint.put(&key, contents).await?;

    let record = ObjectRecord {
        sequence_id,
        key,
        etag: put.etag,
        size: put.size,
        endpoint: endpoint_id,
    };
    if let Err(record) = phase.registry.insert(record) {
        tracing::error!(
            sequence_id = record.sequence_id,
            key = %record.key,
            "object recorded twice"
        );
    }
    Ok(put.size)
}

/// Downloads an object completely, returning its etag and the number of bytes received.
async fn download(endpoint: &Endpoint, key: &str) -> Result<(String, u64)> {
    let mut download = endpoint.get(key).await?;
    let mut received = 0;
    while let Some(chunk) = download.stream.try_next().await? {
        received += chunk.len() as u64;
    }
    Ok((download.stat.etag, received))
}

async fn read_object(phase: &Phase, sequence_id: usize) -> Result<u64> {
    let record = phase.registry.get(sequence_id)?;
    let endpoint = phase.pool.get(record.endpoint);

    let mut attempt = 0;
    let (etag, size) = loop {
        attempt += 1;
        match download(endpoint, &record.key).await {
            Ok(downloaded) => break downloaded,
            Err(error) => {
                endpoint.record_retry();
                tracing::error!(
                    key = %record.key,
                    attempt,
                    error = &error as &dyn std::error::Error,
                    "error during reading"
                );
                if attempt >= phase.read_attempts {
                    return Err(error);
                }
            }
        }
    };

    verify(record, etag, size)?;
    Ok(record.size)
}

async fn stat_object(phase: &Phase, sequence_id: usize) -> Result<u64> {
    let record = phase.registry.get(sequence_id)?;
    let endpoint = phase.pool.get(record.endpoint);

    let stat = endpoint.head(&record.key).await?;
    verify(record, stat.etag, stat.size)?;
    Ok(record.size)
}

async fn remove_object(phase: &Phase, sequence_id: usize) -> Result<u64> {
    let record = phase.registry.get(sequence_id)?;
    let endpoint = phase.pool.get(record.endpoint);

    endpoint.delete(&record.key).await?;
    Ok(record.size)
}

fn verify(record: &ObjectRecord, actual_etag: String, actual_size: u64) -> Result<()> {
    if record.etag != actual_etag || record.size != actual_size {
        return Err(Error::IntegrityMismatch {
            key: record.key.clone(),
            expected_etag: record.etag.clone(),
            actual_etag,
            expected_size: record.size,
            actual_size,
        });
    }
    Ok(())
}
