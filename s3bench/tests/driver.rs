use std::sync::{Arc, Mutex};
use std::time::Duration;

use s3bench::driver::Output;
use s3bench::workload::PayloadGenerator;
use s3bench::{BenchmarkDriver, DriverOptions, DriverState, Error, OperationKind};
use s3bench_service::backend::{BackendOp, Fault, InMemoryBackend};
use s3bench_service::{Endpoint, EndpointPool, RetryPolicy};

const PAYLOAD_SIZE: u64 = 16 * 1024;

fn pool(backends: &[InMemoryBackend], retry: impl Fn() -> RetryPolicy) -> EndpointPool {
    let endpoints = backends
        .iter()
        .enumerate()
        .map(|(index, backend)| {
            Endpoint::new(
                format!("bench-{index}"),
                Box::new(backend.clone()),
                retry(),
                None,
            )
        })
        .collect();
    EndpointPool::new(endpoints).unwrap()
}

fn options(object_count: usize, threads: usize) -> DriverOptions {
    DriverOptions {
        object_count,
        threads,
        payload: PayloadGenerator::new(PAYLOAD_SIZE, PAYLOAD_SIZE, "benchmark/"),
        sample_interval: Duration::from_secs(1),
        read_attempts: 20,
    }
}

fn capture() -> (Output, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let output: Output = Arc::new({
        let lines = lines.clone();
        move |line: &str| lines.lock().unwrap().push(line.to_owned())
    });
    (output, lines)
}

fn phase_of(op: BackendOp) -> usize {
    match op {
        BackendOp::Put => 0,
        BackendOp::Get => 1,
        BackendOp::Head => 2,
        BackendOp::Delete => 3,
        BackendOp::Copy => unreachable!("the benchmark never copies"),
    }
}

#[tokio::test]
async fn runs_all_phases() {
    s3bench_test::tracing::init();

    let backend = InMemoryBackend::default();
    let (output, lines) = capture();
    let pool = pool(&[backend.clone()], RetryPolicy::default);
    let mut driver = BenchmarkDriver::new(pool, options(3, 1)).with_output(output);
    assert_eq!(driver.state(), DriverState::Idle);

    let summaries = driver.run().await.unwrap();
    assert_eq!(driver.state(), DriverState::Done);

    let operations: Vec<_> = summaries.iter().map(|s| s.operation).collect();
    assert_eq!(operations, OperationKind::ALL);
    for summary in &summaries {
        assert_eq!(summary.total_bytes, 3 * PAYLOAD_SIZE);
        assert_eq!(summary.recoverable_errors, 0);
    }

    assert_eq!(driver.registry().len(), 3);
    for record in driver.registry().iter() {
        assert!(record.key.starts_with("benchmark/"));
        assert!(record.key.ends_with(".png"));
        assert_eq!(record.size, PAYLOAD_SIZE);
    }
    assert!(backend.is_empty());

    let ops: Vec<_> = backend.journal().into_iter().map(|(op, _)| op).collect();
    assert_eq!(ops.len(), 12);
    assert!(ops[..3].iter().all(|op| *op == BackendOp::Put));
    assert!(ops[3..6].iter().all(|op| *op == BackendOp::Get));
    assert!(ops[6..9].iter().all(|op| *op == BackendOp::Head));
    assert!(ops[9..].iter().all(|op| *op == BackendOp::Delete));

    let lines = lines.lock().unwrap();
    assert!(
        lines
            .iter()
            .any(|line| line == "Write: scheduling for 3 objects in 1 threads and 1 buckets")
    );
    for operation in OperationKind::ALL {
        let prefix = format!("{operation} took ");
        let summary = lines.iter().find(|line| line.starts_with(&prefix)).unwrap();
        assert!(summary.contains("Total size 0.0MB"));
        assert!(summary.ends_with("Recoverable errors 0"));
    }
}

#[tokio::test]
async fn phases_never_overlap() {
    let backends = [InMemoryBackend::new("a"), InMemoryBackend::new("b")];
    let (output, _lines) = capture();
    let pool = pool(&backends, RetryPolicy::default);
    let mut driver = BenchmarkDriver::new(pool, options(50, 4)).with_output(output);

    driver.run().await.unwrap();

    for backend in &backends {
        let phases: Vec<_> = backend
            .journal()
            .into_iter()
            .map(|(op, _)| phase_of(op))
            .collect();
        assert!(phases.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(backend.is_empty());
    }
}

#[tokio::test]
async fn keeps_objects_on_their_endpoint() {
    let backends = [
        InMemoryBackend::new("a"),
        InMemoryBackend::new("b"),
        InMemoryBackend::new("c"),
    ];
    let (output, lines) = capture();
    let pool = pool(&backends, RetryPolicy::default);
    let mut driver = BenchmarkDriver::new(pool, options(30, 3)).with_output(output);

    driver.run_phase(OperationKind::Write).await.unwrap();

    let stored: usize = backends.iter().map(InMemoryBackend::len).sum();
    assert_eq!(stored, 30);
    for record in driver.registry().iter() {
        assert!(backends[record.endpoint.index()].contains(&record.key));
    }
    assert_eq!(
        lines.lock().unwrap()[0],
        "Write: scheduling for 30 objects in 3 threads and 3 buckets"
    );

    driver.run().await.unwrap();
    assert!(backends.iter().all(InMemoryBackend::is_empty));
}

#[tokio::test]
async fn enforces_phase_order() {
    let (output, _lines) = capture();
    let mut driver = BenchmarkDriver::new(
        pool(&[InMemoryBackend::default()], RetryPolicy::default),
        options(2, 1),
    )
    .with_output(output);

    let error = driver.run_phase(OperationKind::Read).await.unwrap_err();
    assert!(matches!(
        error,
        Error::PhaseOrder {
            expected: Some(OperationKind::Write),
            requested: OperationKind::Read,
        }
    ));
    assert_eq!(driver.state(), DriverState::Idle);

    driver.run().await.unwrap();
    let error = driver.run_phase(OperationKind::Write).await.unwrap_err();
    assert!(matches!(error, Error::PhaseOrder { expected: None, .. }));
}

#[tokio::test]
async fn detects_tampered_objects() {
    let backend = InMemoryBackend::default();
    let (output, lines) = capture();
    let pool = pool(&[backend.clone()], RetryPolicy::default);
    let mut driver = BenchmarkDriver::new(pool, options(3, 1)).with_output(output);

    driver.run_phase(OperationKind::Write).await.unwrap();
    for record in driver.registry().iter() {
        assert!(backend.tamper(&record.key, vec![0u8; 10]));
    }

    let error = driver.run_phase(OperationKind::Read).await.unwrap_err();
    match error {
        Error::IntegrityMismatch {
            expected_size,
            actual_size,
            expected_etag,
            actual_etag,
            ..
        } => {
            assert_eq!(expected_size, PAYLOAD_SIZE);
            assert_eq!(actual_size, 10);
            assert_eq!(expected_etag, actual_etag);
        }
        other => panic!("unexpected error: {other}"),
    }

    // integrity failures are never retried
    let gets = backend
        .journal()
        .iter()
        .filter(|(op, _)| *op == BackendOp::Get)
        .count();
    assert_eq!(gets, 1);
    assert!(!lines.lock().unwrap().iter().any(|line| line.starts_with("Read took")));
}

#[tokio::test]
async fn detects_tampered_metadata() {
    let backend = InMemoryBackend::default();
    let (output, lines) = capture();
    let pool = pool(&[backend.clone()], RetryPolicy::default);
    let mut driver = BenchmarkDriver::new(pool, options(3, 1)).with_output(output);

    driver.run_phase(OperationKind::Write).await.unwrap();
    driver.run_phase(OperationKind::Read).await.unwrap();
    for record in driver.registry().iter() {
        assert!(backend.tamper(&record.key, vec![0u8; 10]));
    }

    let error = driver.run_phase(OperationKind::Stat).await.unwrap_err();
    match error {
        Error::IntegrityMismatch {
            expected_size,
            actual_size,
            ..
        } => {
            assert_eq!(expected_size, PAYLOAD_SIZE);
            assert_eq!(actual_size, 10);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(driver.is_aborted());

    let heads = backend
        .journal()
        .iter()
        .filter(|(op, _)| *op == BackendOp::Head)
        .count();
    assert_eq!(heads, 1);
    assert_eq!(driver.pool().total_retries(), 0);
    assert!(!lines.lock().unwrap().iter().any(|line| line.starts_with("Stat took")));
}

#[tokio::test(start_paused = true)]
async fn logs_every_failed_read() {
    let (_guard, logs) = s3bench_test::tracing::capture();

    let backend = InMemoryBackend::default();
    let (output, _lines) = capture();
    let retry = || RetryPolicy::new(1, Duration::from_secs(1));
    let options = DriverOptions {
        read_attempts: 3,
        ..options(1, 1)
    };
    let mut driver =
        BenchmarkDriver::new(pool(&[backend.clone()], retry), options).with_output(output);

    driver.run_phase(OperationKind::Write).await.unwrap();

    backend.inject(3, Fault::Status(503));
    let error = driver.run_phase(OperationKind::Read).await.unwrap_err();
    assert!(matches!(
        error,
        Error::Endpoint(s3bench_service::Error::RetryExhausted { attempts: 1, .. })
    ));
    assert_eq!(driver.pool().total_retries(), 3);
    assert_eq!(logs.count("error during reading"), 3);
}

#[tokio::test(start_paused = true)]
async fn counts_recoverable_errors_per_phase() {
    let backend = InMemoryBackend::default();
    let (output, _lines) = capture();
    let pool = pool(&[backend.clone()], RetryPolicy::default);
    let mut driver = BenchmarkDriver::new(pool, options(3, 1)).with_output(output);

    backend.inject(2, Fault::Status(503));
    let write = driver.run_phase(OperationKind::Write).await.unwrap();
    assert_eq!(write.recoverable_errors, 2);
    assert_eq!(driver.pool().total_retries(), 0);

    let read = driver.run_phase(OperationKind::Read).await.unwrap();
    assert_eq!(read.recoverable_errors, 0);
}

#[tokio::test(start_paused = true)]
async fn retries_failed_reads() {
    let backend = InMemoryBackend::default();
    let (output, lines) = capture();
    let retry = || RetryPolicy::new(2, Duration::from_secs(1));
    let mut driver =
        BenchmarkDriver::new(pool(&[backend.clone()], retry), options(1, 1)).with_output(output);

    driver.run_phase(OperationKind::Write).await.unwrap();

    // exhausts the endpoint's attempts once, the second outer attempt succeeds
    backend.inject(2, Fault::Status(503));
    let read = driver.run_phase(OperationKind::Read).await.unwrap();
    assert_eq!(read.recoverable_errors, 2);
    assert_eq!(read.total_bytes, PAYLOAD_SIZE);

    let summary = lines.lock().unwrap().last().cloned().unwrap();
    assert!(summary.starts_with("Read took "));
    assert!(summary.ends_with("Recoverable errors 2"));
}

#[tokio::test(start_paused = true)]
async fn aborts_on_exhausted_retries() {
    let backend = InMemoryBackend::default();
    let (output, _lines) = capture();
    let retry = || RetryPolicy::new(3, Duration::from_secs(1));
    let mut driver =
        BenchmarkDriver::new(pool(&[backend.clone()], retry), options(5, 1)).with_output(output);

    backend.inject(3, Fault::Status(500));
    let error = driver.run_phase(OperationKind::Write).await.unwrap_err();
    assert!(matches!(
        error,
        Error::Endpoint(s3bench_service::Error::RetryExhausted { attempts: 3, .. })
    ));
    assert_eq!(driver.state(), DriverState::Writing);
    assert!(driver.is_aborted());

    let error = driver.run_phase(OperationKind::Read).await.unwrap_err();
    assert!(matches!(error, Error::PhaseOrder { expected: None, .. }));
}
