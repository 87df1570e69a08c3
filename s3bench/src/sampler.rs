//! Live per-second throughput sampling while a phase runs.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::operation::OperationKind;

/// Formats a byte count as mebibytes with one decimal, as used in all result lines.
pub fn format_mb(bytes: f64) -> String {
    format!("{:.1}", bytes / 1024.0 / 1024.0)
}

/// Operation and byte counters of a single worker.
///
/// Only the owning worker writes, the sampler reads concurrently.
#[derive(Debug, Default)]
pub struct WorkerSlot {
    count: AtomicU64,
    bytes: AtomicU64,
}

impl WorkerSlot {
    /// Counts one completed operation moving `bytes`.
    pub fn record(&self, bytes: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// The number of completed operations.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// The number of bytes moved by completed operations.
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// The counter slots of all workers of a phase.
#[derive(Debug)]
pub struct WorkerCounters {
    slots: Box<[WorkerSlot]>,
}

impl WorkerCounters {
    /// Creates zeroed slots for `workers` workers.
    pub fn new(workers: usize) -> Self {
        Self {
            slots: (0..workers).map(|_| WorkerSlot::default()).collect(),
        }
    }

    /// The slot owned by `worker_id`.
    ///
    /// # Panics
    ///
    /// Panics if `worker_id` is out of range.
    pub fn slot(&self, worker_id: usize) -> &WorkerSlot {
        &self.slots[worker_id]
    }

    /// Sums all slots into `(count, bytes)`.
    pub fn totals(&self) -> (u64, u64) {
        self.slots.iter().fold((0, 0), |(count, bytes), slot| {
            (count + slot.count(), bytes + slot.bytes())
        })
    }
}

/// An instantaneous throughput measurement.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// The operation being measured.
    pub operation: OperationKind,
    /// Wall-clock UTC time as `HH:MM:SS`.
    pub timestamp: String,
    /// Completed operations per second since the previous sample.
    pub ops_per_sec: f64,
    /// Transferred bytes per second since the previous sample.
    pub bytes_per_sec: f64,
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}: Ops {:.1}/s Throughput {}MB/s",
            self.timestamp,
            self.operation,
            self.ops_per_sec,
            format_mb(self.bytes_per_sec)
        )
    }
}

#[derive(Clone, Copy, Debug)]
struct LastState {
    count: u64,
    bytes: u64,
    time: Instant,
}

/// Computes [`Sample`]s from worker counters and tracks the peak rate of a phase.
#[derive(Debug)]
pub struct LiveSampler {
    operation: OperationKind,
    counters: Arc<WorkerCounters>,
    period: Duration,
    last: LastState,
    peak: f64,
}

impl LiveSampler {
    /// Creates a sampler starting from the current counter values.
    pub fn new(operation: OperationKind, counters: Arc<WorkerCounters>, period: Duration) -> Self {
        let (count, bytes) = counters.totals();
        Self {
            operation,
            counters,
            period,
            last: LastState {
                count,
                bytes,
                time: Instant::now(),
            },
            peak: 0.0,
        }
    }

    /// The highest operation rate sampled so far.
    pub fn peak(&self) -> f64 {
        self.peak
    }

    /// Takes a sample at `now`, labelled with the wall-clock time `wall`.
    pub fn sample(&mut self, now: Instant, wall: DateTime<Utc>) -> Sample {
        let (count, bytes) = self.counters.totals();
        let elapsed = now.saturating_duration_since(self.last.time).as_secs_f64();

        let (ops_per_sec, bytes_per_sec) = if elapsed > 0.0 {
            (
                count.saturating_sub(self.last.count) as f64 / elapsed,
                bytes.saturating_sub(self.last.bytes) as f64 / elapsed,
            )
        } else {
            (0.0, 0.0)
        };

        if ops_per_sec > self.peak {
            self.peak = ops_per_sec;
        }
        self.last = LastState {
            count,
            bytes,
            time: now,
        };

        Sample {
            operation: self.operation,
            timestamp: wall.format("%H:%M:%S").to_string(),
            ops_per_sec,
            bytes_per_sec,
        }
    }

    /// Samples every period until `cancel` fires, passing each sample to `emit`.
    ///
    /// The task resolves to the peak operation rate.
    pub fn spawn<F>(mut self, cancel: CancellationToken, mut emit: F) -> JoinHandle<f64>
    where
        F: FnMut(&Sample) + Send + 'static,
    {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(self.last.time + self.period, self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    tick = interval.tick() => {
                        let sample = self.sample(tick, Utc::now());
                        emit(&sample);
                    }
                }
            }

            self.peak
        })
    }
}
