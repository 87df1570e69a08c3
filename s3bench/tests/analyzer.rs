use std::io::Write;

use s3bench::OperationKind;
use s3bench::timeseries::Reconstructor;
use tempfile::NamedTempFile;

fn log_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn sums_samples_across_logs() {
    let first = log_file("10:00:01: Write: Ops 5.0/s Throughput 0.1MB/s\n");
    let second = log_file("10:00:01: Write: Ops 5.0/s Throughput 0.1MB/s\n");

    let mut reconstructor = Reconstructor::new();
    reconstructor.ingest_file(first.path()).unwrap();
    reconstructor.ingest_file(second.path()).unwrap();

    let peaks = reconstructor.finish();
    assert_eq!(peaks.get(OperationKind::Write), 10.0);
    assert_eq!(
        peaks.to_string(),
        "Peak Performance: {Write: 10, Read: 0, Stat: 0, Remove: 0}"
    );
}

#[test]
fn reconstructs_full_benchmark_logs() {
    let first = log_file(
        "Write: scheduling for 100 objects in 4 threads and 2 buckets\n\
         10:00:01: Write: Ops 40.0/s Throughput 0.6MB/s\n\
         10:00:02: Write: Ops 60.0/s Throughput 0.9MB/s\n\
         Write took 2000ms. Peak ops 60.0/s Avg ops 50.0/s Total size 1.6MB Recoverable errors 0\n\
         Read: scheduling for 100 objects in 4 threads and 2 buckets\n\
         10:00:03: Read: Ops 80.0/s Throughput 1.3MB/s\n\
         10:00:05: Read: Ops 40.0/s Throughput 0.6MB/s\n",
    );
    let second = log_file(
        "10:00:02: Write: Ops 20.0/s Throughput 0.3MB/s\n\
         Stat: scheduling for 100 objects in 4 threads and 2 buckets\n\
         10:00:07: Stat: Ops 200.0/s Throughput 3.1MB/s\n\
         garbage line\n",
    );

    let mut reconstructor = Reconstructor::new();
    let stats = reconstructor.ingest_file(first.path()).unwrap();
    assert_eq!(stats.announcements, 2);
    assert_eq!(stats.samples, 4);
    assert_eq!(stats.skipped, 1);
    reconstructor.ingest_file(second.path()).unwrap();

    let write = reconstructor.series(OperationKind::Write).unwrap();
    assert_eq!(write.get("10:00:02"), Some(80.0));
    // gaps are only filled once all logs are merged
    let read = reconstructor.series(OperationKind::Read).unwrap();
    assert_eq!(read.get("10:00:04"), None);
    assert!(reconstructor.series(OperationKind::Remove).is_none());

    let series = reconstructor.into_series();
    let read = &series[&OperationKind::Read];
    assert_eq!(read.get("10:00:04"), Some(60.0));

    let mut reconstructor = Reconstructor::new();
    reconstructor.ingest_file(first.path()).unwrap();
    reconstructor.ingest_file(second.path()).unwrap();
    let peaks = reconstructor.finish();
    assert_eq!(peaks.get(OperationKind::Write), 80.0);
    assert_eq!(peaks.get(OperationKind::Read), 80.0);
    assert_eq!(peaks.get(OperationKind::Stat), 200.0);
    assert_eq!(peaks.get(OperationKind::Remove), 0.0);
}

#[test]
fn empty_logs_report_zero() {
    let empty = log_file("");

    let mut reconstructor = Reconstructor::new();
    let stats = reconstructor.ingest_file(empty.path()).unwrap();
    assert_eq!(stats.samples, 0);

    assert_eq!(
        reconstructor.finish().to_string(),
        "Peak Performance: {Write: 0, Read: 0, Stat: 0, Remove: 0}"
    );
}

#[test]
fn tolerates_invalid_utf8() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"\xff\xfe\n10:00:01: Remove: Ops 7.5/s Throughput 0.1MB/s\n")
        .unwrap();

    let mut reconstructor = Reconstructor::new();
    reconstructor.ingest_file(file.path()).unwrap();
    assert_eq!(reconstructor.finish().get(OperationKind::Remove), 7.5);
}

#[test]
fn missing_files_are_errors() {
    let mut reconstructor = Reconstructor::new();
    assert!(reconstructor.ingest_file("/nonexistent/s3bench.log").is_err());
}
