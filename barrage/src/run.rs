//! Starting runs and waiting on them
use crate::executor::HttpExecutor;
use crate::scheduler::{run_scheduler, Plan};
use crate::store::ResultStore;
use crate::Error;
use barrage_core::{RequestOutcome, RunConfig, RunResults};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::task::JoinHandle;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, Instrument};

/// Handle to a run that is in progress.
///
/// Await it (or call [`RunHandle::await_completion`]) to get the sealed [`RunResults`] once the
/// run, including its drain phase, has finished. Dropping the handle does not stop the run.
#[pin_project::pin_project]
pub struct RunHandle {
    #[pin]
    task: JoinHandle<RunResults>,
    config: Arc<RunConfig>,
    store: Arc<ResultStore>,
}

impl RunHandle {
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Outcomes recorded so far.
    pub fn recorded(&self) -> u64 {
        self.store.len()
    }

    /// Failures recorded so far.
    pub fn failed(&self) -> u64 {
        self.store.failure_count()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn await_completion(self) -> Result<RunResults, Error> {
        self.await
    }
}

impl Future for RunHandle {
    type Output = Result<RunResults, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project().task.poll(cx).map(|res| res.map_err(Error::from))
    }
}

/// Validate `config` and start issuing HTTP requests in the background.
///
/// Fails before any network activity when the configuration is invalid. Must be called from
/// within a Tokio runtime.
///
/// # Example
/// ```no_run
/// use barrage::prelude::*;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), barrage::Error> {
///     let config = RunConfig::new("http://localhost:3000/")
///         .qps(100)
///         .concurrency(50)
///         .duration(Duration::from_secs(30));
///
///     let results = start_run(config)?.await?;
///     match build_report(&results) {
///         Ok(report) => println!("{report}"),
///         Err(NoData) => println!("Nothing was recorded."),
///     }
///     Ok(())
/// }
/// ```
pub fn start_run(config: RunConfig) -> Result<RunHandle, Error> {
    let executor = HttpExecutor::new(&config)?;
    start_run_with(config, move || {
        let executor = executor.clone();
        async move { executor.execute().await }
    })
}

/// Like [`start_run`], but every request is produced by `request` instead of the built-in HTTP
/// executor. The configured URL is still validated, even though `request` is free to ignore it.
pub fn start_run_with<T, F>(config: RunConfig, request: T) -> Result<RunHandle, Error>
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = RequestOutcome> + Send + 'static,
{
    let limits = config.validate()?;

    #[cfg(feature = "metrics")]
    describe_metrics();

    let store = Arc::new(ResultStore::new());
    let plan = Plan::from(&limits);
    let span = tracing::info_span!("barrage", url = %limits.url);
    let task = tokio::spawn(run_scheduler(request, plan, store.clone()).instrument(span));

    Ok(RunHandle {
        task,
        config: Arc::new(config),
        store,
    })
}

/// Wait for a run, including its drain phase, to finish.
pub async fn await_completion(handle: RunHandle) -> Result<RunResults, Error> {
    handle.await
}

#[cfg(feature = "metrics")]
fn describe_metrics() {
    use crate::executor::{ERROR_METRIC, LATENCY_METRIC, SUCCESS_METRIC};
    use crate::scheduler::IN_FLIGHT_METRIC;

    metrics::describe_histogram!(
        LATENCY_METRIC,
        metrics::Unit::Milliseconds,
        "Latency of successful requests"
    );
    metrics::describe_counter!(SUCCESS_METRIC, "Requests that received a response");
    metrics::describe_counter!(ERROR_METRIC, "Requests that failed before a response");
    metrics::describe_gauge!(IN_FLIGHT_METRIC, "Requests currently in flight");
}

#[cfg(test)]
mod tests {
    use super::*;
    use barrage_core::{FailureKind, InvalidConfigError};
    use std::time::Duration;

    #[tokio::test]
    async fn invalid_config_fails_fast() {
        let err = start_run(RunConfig::new("http://localhost/").qps(0))
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidConfig(InvalidConfigError::Qps(0))));

        let err = start_run(RunConfig::new("::not a url::")).err().unwrap();
        assert!(matches!(
            err,
            Error::InvalidConfig(InvalidConfigError::Url { .. })
        ));

        let err = start_run(RunConfig::new("http://localhost/").method("BAD METHOD"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidConfig(InvalidConfigError::Method(_))));

        let err = start_run_with(
            RunConfig::new("http://localhost/")
                .qps(1)
                .concurrency(1)
                .duration(Duration::from_secs(u64::MAX)),
            || async { RequestOutcome::failure(FailureKind::Other) },
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            Error::InvalidConfig(InvalidConfigError::Duration(_))
        ));
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn custom_request_run() {
        let config = RunConfig::new("http://localhost/")
            .qps(5)
            .concurrency(2)
            .duration(Duration::from_secs(1));

        let handle = start_run_with(config.clone(), || async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            RequestOutcome::failure(FailureKind::Timeout)
        })
        .unwrap();
        assert_eq!(handle.config(), &config);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!handle.is_finished());
        let midway = handle.recorded();
        assert!(midway >= 1, "recorded = {midway}");
        assert_eq!(handle.failed(), midway);

        while !handle.is_finished() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let recorded = handle.recorded();
        assert!(recorded >= midway);
        assert_eq!(handle.failed(), recorded);

        let results = await_completion(handle).await.unwrap();
        assert_eq!(results.total(), recorded);
        assert!((3..=7).contains(&results.total()), "total = {}", results.total());
        assert_eq!(results.failure_count(), results.total());
    }
}
