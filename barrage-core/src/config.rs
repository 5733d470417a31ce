use crate::{
    InvalidConfigError, DEFAULT_CONCURRENCY, DEFAULT_DURATION, DEFAULT_METHOD, DEFAULT_QPS,
    MAX_DURATION,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, BytesOrString, DurationSeconds, DurationSecondsWithFrac};
use std::collections::BTreeMap;
use std::num::{NonZeroU32, NonZeroUsize};
use std::time::Duration;
use url::Url;

/// Configuration for a single load run.
///
/// Immutable once handed to the engine. Numeric fields are kept as plain integers so that
/// configurations coming from the outside (CLI flags, JSON payloads) can be represented before
/// they are checked; [`RunConfig::validate`] is the gate the engine runs before any network
/// activity.
///
/// # Example
/// ```
/// use barrage_core::RunConfig;
/// use std::time::Duration;
///
/// let config = RunConfig::new("http://localhost:3000/api")
///     .method("POST")
///     .header("Content-Type", "application/json")
///     .body(r#"{"key": "value"}"#)
///     .qps(50)
///     .concurrency(20)
///     .duration(Duration::from_secs(30));
///
/// assert!(config.validate().is_ok());
/// ```
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde_as(as = "Option<BytesOrString>")]
    #[serde(alias = "data")]
    pub body: Option<Vec<u8>>,
    #[serde(default = "default_qps")]
    pub qps: u32,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_duration")]
    pub duration: Duration,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-request timeout handed to the HTTP client. `None` leaves the client default in place,
    /// which means a single stalled request can hold up the drain phase.
    #[serde_as(as = "Option<DurationSecondsWithFrac<f64>>")]
    pub request_timeout: Option<Duration>,
}

impl RunConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: BTreeMap::new(),
            body: None,
            qps: default_qps(),
            duration: default_duration(),
            concurrency: default_concurrency(),
            request_timeout: None,
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn qps(mut self, qps: u32) -> Self {
        self.qps = qps;
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Check the numeric limits and the target URL.
    ///
    /// Method and header syntax depend on the HTTP client in use and are checked by the engine
    /// when it builds its executor.
    pub fn validate(&self) -> Result<ValidatedLimits, InvalidConfigError> {
        let qps = NonZeroU32::new(self.qps).ok_or(InvalidConfigError::Qps(self.qps))?;
        let concurrency = NonZeroUsize::new(self.concurrency)
            .ok_or(InvalidConfigError::Concurrency(self.concurrency))?;

        // The wire format carries whole seconds.
        if self.duration.as_secs() == 0 || self.duration > MAX_DURATION {
            return Err(InvalidConfigError::Duration(self.duration));
        }

        if matches!(self.request_timeout, Some(t) if t.is_zero()) {
            return Err(InvalidConfigError::RequestTimeout);
        }

        let url = self.parsed_url()?;
        if self.method.trim().is_empty() {
            return Err(InvalidConfigError::Method(self.method.clone()));
        }

        Ok(ValidatedLimits {
            url,
            qps,
            concurrency,
            duration: self.duration,
        })
    }

    pub fn parsed_url(&self) -> Result<Url, InvalidConfigError> {
        let url = Url::parse(&self.url).map_err(|source| InvalidConfigError::Url {
            url: self.url.clone(),
            source,
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(InvalidConfigError::Scheme(scheme.to_string())),
        }
    }
}

/// The checked, strongly typed limits of a [`RunConfig`].
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedLimits {
    pub url: Url,
    pub qps: NonZeroU32,
    pub concurrency: NonZeroUsize,
    pub duration: Duration,
}

fn default_method() -> String {
    DEFAULT_METHOD.to_string()
}

fn default_qps() -> u32 {
    DEFAULT_QPS.get()
}

fn default_duration() -> Duration {
    DEFAULT_DURATION
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY.get()
}
