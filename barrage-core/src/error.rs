use std::time::Duration;
use thiserror::Error;

/// A [`RunConfig`](crate::RunConfig) that cannot be run. Raised before any network activity.
#[derive(Debug, Error)]
pub enum InvalidConfigError {
    #[error("qps must be at least 1 (got {0})")]
    Qps(u32),

    #[error("concurrency must be at least 1 (got {0})")]
    Concurrency(usize),

    #[error("duration must be between 1s and 7 days (got {0:?})")]
    Duration(Duration),

    #[error("request timeout must be non-zero")]
    RequestTimeout,

    #[error("url {url:?} could not be parsed: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("url scheme {0:?} is not supported; expected http or https")]
    Scheme(String),

    #[error("{0:?} is not a valid HTTP method")]
    Method(String),

    #[error("header {name:?} is not valid: {reason}")]
    Header { name: String, reason: String },
}

impl InvalidConfigError {
    /// Name of the configuration field that failed validation.
    pub fn field(&self) -> &str {
        match self {
            Self::Qps(_) => "qps",
            Self::Concurrency(_) => "concurrency",
            Self::Duration(_) => "duration",
            Self::RequestTimeout => "request_timeout",
            Self::Url { .. } | Self::Scheme(_) => "url",
            Self::Method(_) => "method",
            Self::Header { .. } => "headers",
        }
    }
}
