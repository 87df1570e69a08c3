//! Reconstruction of throughput time series from captured benchmark output.
//!
//! The benchmark prints one sample line per second and phase:
//!
//! ```text
//! 10:00:01: Write: Ops 118.0/s Throughput 1.8MB/s
//! ```
//!
//! Running several benchmark processes in parallel yields several such logs. The
//! [`Reconstructor`] sums their samples per operation and second, approximates single missing
//! seconds, and reports the peak rate of every operation.
//!
//! Timestamps are compared as plain strings. Gaps are only detected within a minute, and the
//! approximated second takes the hour and minute of the later sample.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::operation::OperationKind;

static ANNOUNCEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(Write|Read|Stat|Remove): scheduling").expect("valid announcement pattern")
});

static SAMPLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2}:\d{2}:\d{2}): (Write|Read|Stat|Remove): Ops (\d+\.\d+)/s")
        .expect("valid sample pattern")
});

/// A log line, as far as the reconstructor is concerned.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LogLine<'a> {
    /// The start of a phase.
    Announcement(OperationKind),
    /// A per-second throughput sample.
    Sample {
        /// The `HH:MM:SS` timestamp.
        timestamp: &'a str,
        /// The measured operation.
        operation: OperationKind,
        /// The measured rate.
        ops_per_sec: f64,
    },
    /// Anything else.
    Skip,
}

impl<'a> LogLine<'a> {
    /// Classifies a single line. Patterns may appear anywhere within the line.
    pub fn parse(line: &'a str) -> Self {
        if let Some(captures) = SAMPLE.captures(line) {
            let (Some(timestamp), Some(operation), Some(ops)) =
                (captures.get(1), captures.get(2), captures.get(3))
            else {
                return LogLine::Skip;
            };
            let (Ok(operation), Ok(ops_per_sec)) = (operation.as_str().parse(), ops.as_str().parse())
            else {
                return LogLine::Skip;
            };

            return LogLine::Sample {
                timestamp: timestamp.as_str(),
                operation,
                ops_per_sec,
            };
        }

        ANNOUNCEMENT
            .captures(line)
            .and_then(|captures| captures.get(1)?.as_str().parse().ok())
            .map_or(LogLine::Skip, LogLine::Announcement)
    }
}

/// Operations per second of one operation, keyed by `HH:MM:SS` timestamp.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeSeries {
    points: BTreeMap<String, f64>,
}

impl TimeSeries {
    /// Creates an empty series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `value` to the point at `timestamp`, creating it if needed.
    pub fn add(&mut self, timestamp: impl Into<String>, value: f64) {
        *self.points.entry(timestamp.into()).or_default() += value;
    }

    /// The value at `timestamp`, if present.
    pub fn get(&self, timestamp: &str) -> Option<f64> {
        self.points.get(timestamp).copied()
    }

    /// The number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if the series has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterates over all points in timestamp order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.points.iter().map(|(ts, value)| (ts.as_str(), *value))
    }

    /// Adds every point of `other` into this series.
    pub fn merge(&mut self, other: &TimeSeries) {
        for (timestamp, value) in other.iter() {
            self.add(timestamp, value);
        }
    }

    /// Approximates missing seconds between neighbouring points.
    ///
    /// For every pair of neighbours whose seconds differ by more than one, a single point is
    /// inserted one second after the earlier one, valued at the mean of both. Longer gaps only
    /// receive that one point.
    pub fn fill_gaps(&mut self) {
        let timestamps: Vec<String> = self.points.keys().cloned().collect();

        for pair in timestamps.windows(2) {
            let [prev, curr] = pair else {
                continue;
            };
            let (Some(prev_second), Some(curr_second)) = (seconds_of(prev), seconds_of(curr))
            else {
                continue;
            };
            if curr_second - prev_second <= 1 {
                continue;
            }

            let (Some(prev_value), Some(curr_value)) = (self.get(prev), self.get(curr)) else {
                continue;
            };
            let Some(minute) = curr.get(..curr.len().saturating_sub(2)) else {
                continue;
            };

            let missing = format!("{minute}{:02}", prev_second + 1);
            self.points.insert(missing, (prev_value + curr_value) / 2.0);
        }
    }

    /// The highest value of the series, or `0` if it is empty.
    pub fn peak(&self) -> f64 {
        self.points.values().copied().fold(0.0, f64::max)
    }
}

fn seconds_of(timestamp: &str) -> Option<i64> {
    timestamp.split(':').nth(2)?.parse().ok()
}

/// Counts of what a log contained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogStats {
    /// Phase announcements.
    pub announcements: usize,
    /// Throughput samples.
    pub samples: usize,
    /// Lines that matched neither.
    pub skipped: usize,
}

/// The peak rate of every operation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PeakPerformance {
    /// Peak write rate.
    pub write: f64,
    /// Peak read rate.
    pub read: f64,
    /// Peak stat rate.
    pub stat: f64,
    /// Peak remove rate.
    pub remove: f64,
}

impl PeakPerformance {
    /// The peak of the given operation.
    pub fn get(&self, operation: OperationKind) -> f64 {
        match operation {
            OperationKind::Write => self.write,
            OperationKind::Read => self.read,
            OperationKind::Stat => self.stat,
            OperationKind::Remove => self.remove,
        }
    }
}

impl fmt::Display for PeakPerformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Peak Performance: {{Write: {}, Read: {}, Stat: {}, Remove: {}}}",
            self.write, self.read, self.stat, self.remove
        )
    }
}

/// Merges the samples of any number of logs into one time series per operation.
#[derive(Debug, Default)]
pub struct Reconstructor {
    series: BTreeMap<OperationKind, TimeSeries>,
}

impl Reconstructor {
    /// Creates a reconstructor without any samples.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the samples of one log.
    pub fn ingest_str(&mut self, log: &str) -> LogStats {
        let mut stats = LogStats::default();
        // the phase announced last, only used to flag samples of other phases
        let mut current = None;

        for line in log.lines() {
            match LogLine::parse(line) {
                LogLine::Announcement(operation) => {
                    stats.announcements += 1;
                    current = Some(operation);
                }
                LogLine::Sample {
                    timestamp,
                    operation,
                    ops_per_sec,
                } => {
                    stats.samples += 1;
                    if current.is_some_and(|current| current != operation) {
                        tracing::trace!(
                            %operation,
                            ?current,
                            timestamp,
                            "sample outside its phase"
                        );
                    }
                    self.series
                        .entry(operation)
                        .or_default()
                        .add(timestamp, ops_per_sec);
                }
                LogLine::Skip => stats.skipped += 1,
            }
        }

        stats
    }

    /// Adds the samples of a log read from `reader`. Invalid UTF-8 is replaced, not rejected.
    pub fn ingest_reader(&mut self, mut reader: impl Read) -> io::Result<LogStats> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(self.ingest_str(&String::from_utf8_lossy(&buf)))
    }

    /// Adds the samples of the log file at `path`.
    pub fn ingest_file(&mut self, path: impl AsRef<Path>) -> io::Result<LogStats> {
        let path = path.as_ref();
        let stats = self.ingest_reader(std::fs::File::open(path)?)?;
        tracing::debug!(path = %path.display(), ?stats, "ingested log");
        Ok(stats)
    }

    /// The merged series of an operation so far.
    pub fn series(&self, operation: OperationKind) -> Option<&TimeSeries> {
        self.series.get(&operation)
    }

    /// Fills gaps in every series and returns the series by operation.
    pub fn into_series(mut self) -> BTreeMap<OperationKind, TimeSeries> {
        for series in self.series.values_mut() {
            series.fill_gaps();
        }
        self.series
    }

    /// Fills gaps in every series and extracts the peak of each operation.
    pub fn finish(self) -> PeakPerformance {
        let series = self.into_series();
        let peak = |operation| series.get(&operation).map_or(0.0, TimeSeries::peak);

        PeakPerformance {
            write: peak(OperationKind::Write),
            read: peak(OperationKind::Read),
            stat: peak(OperationKind::Stat),
            remove: peak(OperationKind::Remove),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(points: &[(&str, f64)]) -> TimeSeries {
        let mut series = TimeSeries::new();
        for (timestamp, value) in points {
            series.add(*timestamp, *value);
        }
        series
    }

    #[test]
    fn parses_lines() {
        assert_eq!(
            LogLine::parse("10:00:01: Write: Ops 5.0/s Throughput 0.1MB/s"),
            LogLine::Sample {
                timestamp: "10:00:01",
                operation: OperationKind::Write,
                ops_per_sec: 5.0
            }
        );
        assert_eq!(
            LogLine::parse("Read: scheduling for 10 objects in 2 threads and 1 buckets"),
            LogLine::Announcement(OperationKind::Read)
        );
        // integers are not samples
        assert_eq!(LogLine::parse("10:00:01: Write: Ops 5/s"), LogLine::Skip);
        assert_eq!(
            LogLine::parse("Write took 12ms. Peak ops 5.0/s Avg ops 4.0/s"),
            LogLine::Skip
        );
        assert_eq!(LogLine::parse(""), LogLine::Skip);
    }

    #[test]
    fn fills_single_second_gap() {
        let mut ts = series(&[("10:00:01", 4.0), ("10:00:03", 6.0)]);
        ts.fill_gaps();
        assert_eq!(ts.get("10:00:02"), Some(5.0));
        assert_eq!(ts.len(), 3);
    }

    #[test]
    fn fills_only_one_point_of_longer_gaps() {
        let mut ts = series(&[("10:00:01", 4.0), ("10:00:05", 6.0)]);
        ts.fill_gaps();
        assert_eq!(ts.get("10:00:02"), Some(5.0));
        assert_eq!(ts.get("10:00:03"), None);
        assert_eq!(ts.get("10:00:04"), None);
    }

    #[test]
    fn leaves_contiguous_and_minute_crossing_series_alone() {
        let mut ts = series(&[("10:00:58", 1.0), ("10:00:59", 2.0), ("10:01:00", 3.0)]);
        let before = ts.clone();
        ts.fill_gaps();
        assert_eq!(ts, before);
    }

    #[test]
    fn peaks() {
        assert_eq!(series(&[("a", 1.0), ("b", 9.0), ("c", 3.0)]).peak(), 9.0);
        assert_eq!(TimeSeries::new().peak(), 0.0);
    }

    #[test]
    fn counts_lines() {
        let mut reconstructor = Reconstructor::new();
        let stats = reconstructor.ingest_str(
            "Write: scheduling for 1 objects in 1 threads and 1 buckets\n\
             10:00:01: Write: Ops 1.0/s Throughput 0.0MB/s\n\
             garbage\n",
        );
        assert_eq!(
            stats,
            LogStats {
                announcements: 1,
                samples: 1,
                skipped: 1
            }
        );
    }

    #[test]
    fn displays_peaks() {
        let peaks = PeakPerformance {
            write: 10.0,
            read: 2.5,
            ..Default::default()
        };
        assert_eq!(
            peaks.to_string(),
            "Peak Performance: {Write: 10, Read: 2.5, Stat: 0, Remove: 0}"
        );
    }
}
