//! Single-request execution
use crate::Error;
use barrage_core::{FailureKind, InvalidConfigError, RequestOutcome, RunConfig};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Url};
use std::time::Instant;
#[allow(unused)]
use tracing::{debug, error, trace, warn};

#[cfg(feature = "metrics")]
pub(crate) const LATENCY_METRIC: &str = "barrage_request_latency_ms";
#[cfg(feature = "metrics")]
pub(crate) const SUCCESS_METRIC: &str = "barrage_request_success";
#[cfg(feature = "metrics")]
pub(crate) const ERROR_METRIC: &str = "barrage_request_error";

/// Issues one HTTP request per call and turns whatever happens into a [`RequestOutcome`].
///
/// Cloning is cheap and every clone shares the same connection pool.
#[derive(Clone, Debug)]
pub struct HttpExecutor {
    client: Client,
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
}

impl HttpExecutor {
    /// Build an executor with a fresh client for the given configuration.
    pub fn new(config: &RunConfig) -> Result<Self, Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(Error::Client)?;
        Ok(Self::with_client(client, config)?)
    }

    /// Build an executor around an existing client.
    pub fn with_client(client: Client, config: &RunConfig) -> Result<Self, InvalidConfigError> {
        let url = config.parsed_url()?;

        let method = Method::from_bytes(config.method.trim().to_uppercase().as_bytes())
            .map_err(|_| InvalidConfigError::Method(config.method.clone()))?;

        let mut headers = HeaderMap::with_capacity(config.headers.len());
        for (name, value) in &config.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| InvalidConfigError::Header {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| InvalidConfigError::Header {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            // Names that differ only in case are the same header; send every value.
            headers.append(header_name, header_value);
        }

        Ok(Self {
            client,
            method,
            url,
            headers,
            body: config.body.clone(),
        })
    }

    /// Issue the request and read the response body to completion.
    ///
    /// Latency covers everything from sending the request to the last byte of the body. Never
    /// fails: transport errors come back as [`RequestOutcome::Failure`].
    pub async fn execute(&self) -> RequestOutcome {
        let mut request = self
            .client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone());
        if let Some(body) = &self.body {
            request = request.body(body.clone());
        }

        let start = Instant::now();
        let outcome = match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.bytes().await {
                    Ok(_) => RequestOutcome::success(start.elapsed(), status),
                    Err(err) => failed(&err),
                }
            }
            Err(err) => failed(&err),
        };

        #[cfg(feature = "metrics")]
        record_metrics(&outcome);

        outcome
    }
}

fn failed(err: &reqwest::Error) -> RequestOutcome {
    let kind = classify(err);
    warn!(%kind, "Request failed: {err}");
    RequestOutcome::failure(kind)
}

fn classify(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_connect() {
        FailureKind::Connect
    } else if err.is_redirect() {
        FailureKind::Redirect
    } else if err.is_body() || err.is_decode() {
        FailureKind::Body
    } else if err.is_request() || err.is_builder() {
        FailureKind::Request
    } else {
        FailureKind::Other
    }
}

#[cfg(feature = "metrics")]
fn record_metrics(outcome: &RequestOutcome) {
    match outcome {
        RequestOutcome::Success { latency_ms, .. } => {
            metrics::histogram!(LATENCY_METRIC).record(*latency_ms);
            metrics::counter!(SUCCESS_METRIC).increment(1);
        }
        RequestOutcome::Failure { .. } => {
            metrics::counter!(ERROR_METRIC).increment(1);
        }
    }
}
