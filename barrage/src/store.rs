use barrage_core::RequestOutcome;
use metrics_util::AtomicBucket;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
#[allow(unused)]
use tracing::{debug, error, trace};

/// Append-only sink for request outcomes, safe to share between any number of concurrently
/// running requests.
///
/// Appends never block. Each outcome is tagged with its append sequence number so that
/// [`ResultStore::seal`] can hand them back in append order.
pub struct ResultStore {
    outcomes: AtomicBucket<(u64, RequestOutcome)>,
    next_seq: AtomicU64,
    failures: AtomicU64,
    sealed: AtomicBool,
}

impl ResultStore {
    pub fn new() -> Self {
        Self {
            outcomes: AtomicBucket::new(),
            next_seq: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            sealed: AtomicBool::new(false),
        }
    }

    /// Append one outcome. Returns `false` (and drops the outcome) once the store is sealed.
    pub fn record(&self, outcome: RequestOutcome) -> bool {
        if self.sealed.load(Ordering::Acquire) {
            error!("Outcome recorded after the run was sealed; dropping it.");
            return false;
        }

        if !outcome.is_success() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.outcomes.push((seq, outcome));
        true
    }

    /// Number of outcomes recorded so far.
    pub fn len(&self) -> u64 {
        self.next_seq.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Close the store to further writes and return every outcome in append order.
    ///
    /// Only call this once all writers are done; an append racing the seal may be missed.
    pub fn seal(&self) -> Vec<RequestOutcome> {
        self.sealed.store(true, Ordering::Release);

        let mut tagged = self.outcomes.data();
        tagged.sort_unstable_by_key(|(seq, _)| *seq);
        trace!("Sealed store with {} outcomes", tagged.len());
        tagged.into_iter().map(|(_, outcome)| outcome).collect()
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResultStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultStore")
            .field("len", &self.len())
            .field("failures", &self.failure_count())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}
