use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::fmt;
use std::time::Duration;

/// Why a request produced no response.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The connection could not be established (refused, DNS, TLS handshake).
    Connect,
    Timeout,
    /// The request could not be built or sent.
    Request,
    /// The response body could not be read to completion.
    Body,
    Redirect,
    /// The task issuing the request died before recording an outcome.
    Internal,
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Connect => "connect",
            FailureKind::Timeout => "timeout",
            FailureKind::Request => "request",
            FailureKind::Body => "body",
            FailureKind::Redirect => "redirect",
            FailureKind::Internal => "internal",
            FailureKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// The recorded result of one request attempt.
///
/// Any HTTP status counts as a success; only transport-level problems are failures.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RequestOutcome {
    Success { latency_ms: f64, status: u16 },
    Failure { kind: FailureKind },
}

impl RequestOutcome {
    pub fn success(latency: Duration, status: u16) -> Self {
        Self::Success {
            latency_ms: latency.as_nanos() as f64 / 1e6,
            status,
        }
    }

    pub fn failure(kind: FailureKind) -> Self {
        Self::Failure { kind }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn latency_ms(&self) -> Option<f64> {
        match self {
            Self::Success { latency_ms, .. } => Some(*latency_ms),
            Self::Failure { .. } => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Success { status, .. } => Some(*status),
            Self::Failure { .. } => None,
        }
    }
}

/// Everything a finished run recorded.
///
/// Outcomes are in append order, which is completion order rather than issue order.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResults {
    pub outcomes: Vec<RequestOutcome>,
    /// Wall-clock time from the first issuance to the end of the drain phase.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub elapsed: Duration,
    /// Highest number of requests observed in flight at once.
    pub peak_concurrency: usize,
}

impl RunResults {
    pub fn new(outcomes: Vec<RequestOutcome>) -> Self {
        Self {
            outcomes,
            ..Default::default()
        }
    }

    pub fn total(&self) -> u64 {
        self.outcomes.len() as u64
    }

    pub fn success_count(&self) -> u64 {
        self.outcomes.iter().filter(|o| o.is_success()).count() as u64
    }

    pub fn failure_count(&self) -> u64 {
        self.total() - self.success_count()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_is_recorded_in_milliseconds() {
        let outcome = RequestOutcome::success(Duration::from_micros(12_500), 200);
        assert_eq!(outcome.latency_ms(), Some(12.5));
        assert_eq!(outcome.status(), Some(200));
        assert!(outcome.is_success());
    }

    #[test]
    fn failures_carry_no_latency() {
        let outcome = RequestOutcome::failure(FailureKind::Connect);
        assert!(!outcome.is_success());
        assert_eq!(outcome.latency_ms(), None);
        assert_eq!(outcome.status(), None);
    }

    #[test]
    fn counts_add_up() {
        let results = RunResults::new(vec![
            RequestOutcome::success(Duration::from_millis(100), 200),
            RequestOutcome::failure(FailureKind::Timeout),
            RequestOutcome::success(Duration::from_millis(100), 500),
        ]);

        assert_eq!(results.total(), 3);
        assert_eq!(results.success_count(), 2);
        assert_eq!(results.failure_count(), 1);
        assert_eq!(
            results.total(),
            results.success_count() + results.failure_count()
        );
    }
}
