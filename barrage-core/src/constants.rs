use std::num::{NonZeroU32, NonZeroUsize};
use std::time::Duration;

/// The default request rate used when none is configured.
pub const DEFAULT_QPS: NonZeroU32 = unsafe { NonZeroU32::new_unchecked(10) };

/// The default run length used when none is configured.
pub const DEFAULT_DURATION: Duration = Duration::from_secs(60);

/// The default in-flight ceiling used when none is configured.
pub const DEFAULT_CONCURRENCY: NonZeroUsize = unsafe { NonZeroUsize::new_unchecked(100) };

/// Longest run accepted by validation. Deadlines are computed as `start + duration`, which must
/// not overflow the clock.
pub const MAX_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub const DEFAULT_METHOD: &str = "GET";

/// Upper bound on how long the scheduler waits for completions once the in-flight count reaches
/// the target rate.
pub const SATURATION_WAIT: Duration = Duration::from_secs(1);

/// How often the scheduler emits a progress event.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Bin count used for latency histograms when the caller has no preference.
pub const DEFAULT_HISTOGRAM_BINS: usize = 50;

/// Largest bin count a latency histogram is built with.
pub const MAX_HISTOGRAM_BINS: usize = 1_000;

/// Percentiles reported for every run, in ascending order.
pub const REPORTED_PERCENTILES: [f64; 4] = [50., 90., 95., 99.];
