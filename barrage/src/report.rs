//! Aggregate statistics over a finished run
use barrage_core::{LatencyStats, Report, RequestOutcome, RunResults, REPORTED_PERCENTILES};
use std::collections::BTreeMap;
use thiserror::Error;

/// Nothing was recorded, so there is nothing to report on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[error("No requests were recorded during the run")]
pub struct NoData;

/// Reduce sealed run results into a [`Report`].
///
/// Latency statistics only consider successful requests and are all zero when there were none.
/// The reduction is pure: the same results always produce the same report.
pub fn build_report(results: &RunResults) -> Result<Report, NoData> {
    if results.is_empty() {
        return Err(NoData);
    }

    let mut latencies = Vec::with_capacity(results.outcomes.len());
    let mut status_codes = BTreeMap::new();
    let mut failures = BTreeMap::new();
    for outcome in &results.outcomes {
        match *outcome {
            RequestOutcome::Success { latency_ms, status } => {
                latencies.push(latency_ms);
                *status_codes.entry(status).or_insert(0) += 1;
            }
            RequestOutcome::Failure { kind } => {
                *failures.entry(kind).or_insert(0) += 1;
            }
        }
    }

    let total_requests = results.total();
    let success_count = latencies.len() as u64;
    let failure_count = total_requests - success_count;

    let elapsed_secs = results.elapsed.as_secs_f64();
    let achieved_qps = if elapsed_secs > 0. {
        total_requests as f64 / elapsed_secs
    } else {
        0.
    };

    Ok(Report {
        total_requests,
        success_count,
        failure_count,
        error_rate: failure_count as f64 / total_requests as f64,
        latency: latency_stats(&latencies),
        latencies,
        status_codes,
        failures,
        elapsed: results.elapsed,
        achieved_qps,
        peak_concurrency: results.peak_concurrency,
    })
}

fn latency_stats(latencies: &[f64]) -> LatencyStats {
    if latencies.is_empty() {
        return LatencyStats::default();
    }

    let mut sorted = latencies.to_vec();
    sorted.sort_by(f64::total_cmp);
    let [p50, p90, p95, p99] = REPORTED_PERCENTILES.map(|pct| percentile(&sorted, pct));

    LatencyStats {
        mean: statistical::mean(latencies),
        median: statistical::median(latencies),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        p50,
        p90,
        p95,
        p99,
    }
}

/// The `pct`th percentile of already sorted values, interpolating linearly between the two
/// closest ranks. Returns `0` for an empty slice.
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.,
        1 => sorted[0],
        n => {
            let rank = (pct / 100.).clamp(0., 1.) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}
