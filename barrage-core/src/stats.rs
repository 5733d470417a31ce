use crate::{FailureKind, MAX_HISTOGRAM_BINS};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Aggregate latency statistics over successful requests, in milliseconds.
///
/// Every field is `0` when no request succeeded.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    #[serde(rename = "avg_latency")]
    pub mean: f64,
    #[serde(rename = "median_latency")]
    pub median: f64,
    #[serde(rename = "min_latency")]
    pub min: f64,
    #[serde(rename = "max_latency")]
    pub max: f64,
    #[serde(rename = "p50_latency")]
    pub p50: f64,
    #[serde(rename = "p90_latency")]
    pub p90: f64,
    #[serde(rename = "p95_latency")]
    pub p95: f64,
    #[serde(rename = "p99_latency")]
    pub p99: f64,
}

/// Final statistics for a run.
///
/// Built once from sealed run results and never modified afterwards. Field names on the wire
/// follow the JSON format consumed by the plotting and web front-ends.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Report {
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub error_rate: f64,
    #[serde(flatten)]
    pub latency: LatencyStats,
    /// Latencies of successful requests in the order they were recorded.
    pub latencies: Vec<f64>,
    pub status_codes: BTreeMap<u16, u64>,
    pub failures: BTreeMap<FailureKind, u64>,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(rename = "elapsed_secs")]
    pub elapsed: Duration,
    pub achieved_qps: f64,
    pub peak_concurrency: usize,
}

impl Report {
    /// Equal-width bins spanning `[min, max]` of the recorded latencies.
    ///
    /// Each bin is tagged with the percentile band its lower edge falls in. A run where every
    /// latency is identical gets a one millisecond wide range centered on that value. Returns an
    /// empty vector when there are no latencies or `bins` is zero. `bins` is capped at
    /// [`MAX_HISTOGRAM_BINS`].
    pub fn latency_histogram(&self, bins: usize) -> Vec<HistogramBin> {
        let bins = bins.min(MAX_HISTOGRAM_BINS);
        if self.latencies.is_empty() || bins == 0 {
            return vec![];
        }

        let (mut lo, mut hi) = (self.latency.min, self.latency.max);
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }
        let width = (hi - lo) / bins as f64;

        let mut counts = vec![0u64; bins];
        for latency in &self.latencies {
            let idx = (((latency - lo) / width) as usize).min(bins - 1);
            counts[idx] += 1;
        }

        counts
            .into_iter()
            .enumerate()
            .map(|(i, count)| {
                let start = lo + width * i as f64;
                let end = if i + 1 == bins {
                    hi
                } else {
                    lo + width * (i + 1) as f64
                };
                HistogramBin {
                    start,
                    end,
                    count,
                    band: self.band(start),
                }
            })
            .collect()
    }

    /// Which percentile band a latency (in milliseconds) falls in.
    pub fn band(&self, latency_ms: f64) -> PercentileBand {
        let LatencyStats { p50, p90, p95, p99, .. } = self.latency;
        if latency_ms < p50 {
            PercentileBand::BelowP50
        } else if latency_ms < p90 {
            PercentileBand::P50ToP90
        } else if latency_ms < p95 {
            PercentileBand::P90ToP95
        } else if latency_ms < p99 {
            PercentileBand::P95ToP99
        } else {
            PercentileBand::AboveP99
        }
    }

    /// Status code counts grouped by class (`1xx` to `5xx`).
    pub fn status_classes(&self) -> BTreeMap<StatusClass, u64> {
        let mut classes = BTreeMap::new();
        for (code, count) in &self.status_codes {
            *classes.entry(StatusClass::of(*code)).or_insert(0) += count;
        }
        classes
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = Duration::from_millis(self.elapsed.as_millis() as u64);
        writeln!(
            f,
            "Requests={} (ok={}, failed={}), ErrorRate={:.2}%, QPS={:.2}, PeakConcurrency={}, Elapsed={}",
            self.total_requests,
            self.success_count,
            self.failure_count,
            self.error_rate * 100.,
            self.achieved_qps,
            self.peak_concurrency,
            humantime::format_duration(elapsed),
        )?;
        writeln!(
            f,
            "Latency(ms): avg={:.2}, min={:.2}, max={:.2}, p50={:.2}, p90={:.2}, p95={:.2}, p99={:.2}",
            self.latency.mean,
            self.latency.min,
            self.latency.max,
            self.latency.p50,
            self.latency.p90,
            self.latency.p95,
            self.latency.p99,
        )?;

        write!(f, "Status:")?;
        if self.status_codes.is_empty() {
            write!(f, " none")?;
        }
        for (code, count) in &self.status_codes {
            write!(f, " {code}={count}")?;
        }

        if !self.failures.is_empty() {
            write!(f, "\nFailures:")?;
            for (kind, count) in &self.failures {
                write!(f, " {kind}={count}")?;
            }
        }
        Ok(())
    }
}

/// One bar of a latency histogram.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: u64,
    pub band: PercentileBand,
}

/// Latency bands delimited by the reported percentiles, fastest first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentileBand {
    BelowP50,
    P50ToP90,
    P90ToP95,
    P95ToP99,
    AboveP99,
}

/// HTTP status code class.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatusClass {
    #[serde(rename = "1xx")]
    Informational,
    #[serde(rename = "2xx")]
    Success,
    #[serde(rename = "3xx")]
    Redirection,
    #[serde(rename = "4xx")]
    ClientError,
    #[serde(rename = "5xx")]
    ServerError,
    #[serde(rename = "other")]
    Other,
}

impl StatusClass {
    pub fn of(code: u16) -> Self {
        match code {
            100..=199 => Self::Informational,
            200..=299 => Self::Success,
            300..=399 => Self::Redirection,
            400..=499 => Self::ClientError,
            500..=599 => Self::ServerError,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Informational => "1xx",
            Self::Success => "2xx",
            Self::Redirection => "3xx",
            Self::ClientError => "4xx",
            Self::ServerError => "5xx",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}
