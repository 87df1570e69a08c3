use std::io;
use std::sync::{Arc, Mutex};

use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

const CRATE_NAMES: &[&str] = &["s3bench", "s3bench_service"];

fn crate_filter() -> EnvFilter {
    let mut env_filter = EnvFilter::new("ERROR");

    for name in CRATE_NAMES {
        if let Ok(directive) = format!("{name}=TRACE").parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    env_filter
}

/// Initialize the logger for testing.
///
/// This logs to the stdout registered by the Rust test runner, and only captures logs from the
/// benchmark crates.
///
/// # Example
///
/// ```
/// s3bench_test::tracing::init();
/// ```
pub fn init() {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(crate_filter())
        .with_target(true)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}

/// Log lines recorded by [`capture`].
#[derive(Clone, Debug, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// All lines logged so far.
    pub fn lines(&self) -> Vec<String> {
        let buf = self.0.lock().unwrap();
        String::from_utf8_lossy(&buf)
            .lines()
            .map(str::to_owned)
            .collect()
    }

    /// The number of logged lines containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.lines()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Records the logs of the current thread until the returned guard is dropped.
///
/// Tasks spawned on a current-thread runtime log into the same buffer.
///
/// # Example
///
/// ```
/// let (_guard, logs) = s3bench_test::tracing::capture();
/// assert!(logs.lines().is_empty());
/// ```
pub fn capture() -> (DefaultGuard, CapturedLogs) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt::fmt()
        .with_env_filter(crate_filter())
        .with_ansi(false)
        .with_writer({
            let logs = logs.clone();
            move || logs.clone()
        })
        .finish();

    (tracing::subscriber::set_default(subscriber), logs)
}
