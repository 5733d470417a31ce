//! Rate-paced, concurrency-bounded request issuance
use crate::store::ResultStore;
use barrage_core::{
    FailureKind, RequestOutcome, RunResults, ValidatedLimits, PROGRESS_INTERVAL, SATURATION_WAIT,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::future::Future;
use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep_until, timeout, Instant};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

#[cfg(feature = "metrics")]
pub(crate) const IN_FLIGHT_METRIC: &str = "barrage_in_flight";

/// The limits a scheduler run works within.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Plan {
    pub qps: NonZeroU32,
    pub concurrency: NonZeroUsize,
    pub duration: Duration,
}

impl From<&ValidatedLimits> for Plan {
    fn from(limits: &ValidatedLimits) -> Self {
        Self {
            qps: limits.qps,
            concurrency: limits.concurrency,
            duration: limits.duration,
        }
    }
}

/// Drive a run: issue requests paced at `plan.qps` while never holding more than
/// `plan.concurrency` in flight, stop issuing at the deadline, then wait for every outstanding
/// request before sealing the store.
///
/// Requests that are still in flight at the deadline are never cancelled, so the run lasts
/// `plan.duration` plus the tail latency of the last requests.
#[instrument(name = "run", skip_all, fields(qps = plan.qps.get(), concurrency = plan.concurrency.get()))]
pub(crate) async fn run_scheduler<T, F>(request: T, plan: Plan, store: Arc<ResultStore>) -> RunResults
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = RequestOutcome> + Send + 'static,
{
    info!(
        "Starting run for {} at {} QPS with at most {} in flight",
        humantime::format_duration(plan.duration),
        plan.qps,
        plan.concurrency
    );

    let start = Instant::now();
    let deadline = start + plan.duration;
    let limiter = rate_limiter(plan.qps);
    let soft_limit = plan.qps.get() as usize;
    let in_flight = Arc::new(InFlight::default());
    let mut tasks = JoinSet::new();
    let mut issued: u64 = 0;
    let mut last_progress = start;

    // NOTE: This loop is time-sensitive. Any long awaits or blocking will throw off pacing.
    loop {
        tokio::select! {
            _ = limiter.until_ready() => {}
            _ = sleep_until(deadline) => break,
        }
        if Instant::now() >= deadline {
            break;
        }

        while let Some(res) = tasks.try_join_next() {
            handle_join(res, &store);
        }

        if tasks.len() < plan.concurrency.get() {
            let guard = in_flight.enter();
            let request = request.clone();
            let store = store.clone();
            tasks.spawn(
                async move {
                    let _guard = guard;
                    let outcome = request().await;
                    store.record(outcome);
                }
                .in_current_span(),
            );
            issued += 1;
        } else {
            trace!("At the concurrency ceiling; skipping this issuance slot.");
        }

        if tasks.len() >= soft_limit {
            let wait = SATURATION_WAIT.min(deadline.saturating_duration_since(Instant::now()));
            trace!(
                "{} requests in flight at {} QPS; waiting up to {:?} for completions.",
                tasks.len(),
                soft_limit,
                wait
            );
            if let Ok(Some(res)) = timeout(wait, tasks.join_next()).await {
                handle_join(res, &store);
            }
        }

        if last_progress.elapsed() >= PROGRESS_INTERVAL {
            debug!(
                issued,
                in_flight = tasks.len(),
                recorded = store.len(),
                failed = store.failure_count(),
                "Progress"
            );
            last_progress = Instant::now();
        }
    }

    debug!(
        issued,
        in_flight = tasks.len(),
        "Deadline reached; draining in-flight requests."
    );
    while let Some(res) = tasks.join_next().await {
        handle_join(res, &store);
    }

    let elapsed = start.elapsed();
    let outcomes = store.seal();
    info!(
        "Run complete: {} requests ({} failed) in {}",
        outcomes.len(),
        store.failure_count(),
        humantime::format_duration(Duration::from_millis(elapsed.as_millis() as u64)),
    );

    RunResults {
        outcomes,
        elapsed,
        peak_concurrency: in_flight.peak(),
    }
}

fn handle_join(res: Result<(), JoinError>, store: &ResultStore) {
    if let Err(err) = res {
        // The task never got to record anything, so account for it here.
        error!("Request task ended abnormally: {err}");
        store.record(RequestOutcome::failure(FailureKind::Internal));
    }
}

fn rate_limiter(qps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(qps).allow_burst(NonZeroU32::MIN))
}

/// Tracks the number of requests currently in flight and the highest value it has reached.
#[derive(Debug, Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        let now = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);

        #[cfg(feature = "metrics")]
        metrics::gauge!(IN_FLIGHT_METRIC).increment(1.);

        InFlightGuard {
            in_flight: self.clone(),
        }
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }
}

struct InFlightGuard {
    in_flight: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.current.fetch_sub(1, Ordering::AcqRel);

        #[cfg(feature = "metrics")]
        metrics::gauge!(IN_FLIGHT_METRIC).decrement(1.);
    }
}
