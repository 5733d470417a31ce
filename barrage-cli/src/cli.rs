use barrage_core::{
    RunConfig, DEFAULT_CONCURRENCY, DEFAULT_DURATION, DEFAULT_HISTOGRAM_BINS, DEFAULT_METHOD,
    DEFAULT_QPS, MAX_HISTOGRAM_BINS,
};
use clap::builder::RangedU64ValueParser;
use clap::{Parser, ValueEnum};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "barrage", version, about = "HTTP load testing tool")]
pub struct Cli {
    /// Target URL
    pub url: String,

    /// Queries per second
    #[arg(long, default_value_t = DEFAULT_QPS.get())]
    pub qps: u32,

    /// Test duration in seconds
    #[arg(long, default_value_t = DEFAULT_DURATION.as_secs())]
    pub duration: u64,

    /// HTTP method
    #[arg(long, default_value = DEFAULT_METHOD)]
    pub method: String,

    /// HTTP headers as a JSON object
    #[arg(long, value_parser = parse_json_headers)]
    pub headers: Option<BTreeMap<String, String>>,

    /// Additional header as `Name: value`. May be repeated; wins over `--headers`.
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub header: Vec<(String, String)>,

    /// Request body data
    #[arg(long)]
    pub data: Option<String>,

    /// Maximum number of concurrent requests
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY.get())]
    pub concurrency: usize,

    /// Per-request timeout, e.g. `5s` or `750ms`. No timeout when omitted.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// How to print the report
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Latency histogram bins shown with `--format summary`. `0` hides the histogram.
    #[arg(
        long,
        default_value_t = DEFAULT_HISTOGRAM_BINS,
        value_parser = RangedU64ValueParser::<usize>::new().range(0..=MAX_HISTOGRAM_BINS as u64),
    )]
    pub bins: usize,

    /// Serve Prometheus metrics on this address while the test runs
    #[arg(long)]
    pub prometheus: Option<SocketAddr>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Summary,
}

impl Cli {
    pub fn to_config(&self) -> RunConfig {
        let mut config = RunConfig::new(&self.url)
            .method(&self.method)
            .qps(self.qps)
            .duration(Duration::from_secs(self.duration))
            .concurrency(self.concurrency);

        let flags = self.header.iter().map(|(name, value)| (name, value));
        for (name, value) in self.headers.iter().flatten().chain(flags) {
            config = config.header(name, value);
        }
        if let Some(data) = &self.data {
            config = config.body(data.as_str());
        }
        if let Some(timeout) = self.timeout {
            config = config.request_timeout(timeout);
        }
        config
    }
}

fn parse_json_headers(s: &str) -> Result<BTreeMap<String, String>, String> {
    let map: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(s).map_err(|e| format!("expected a JSON object: {e}"))?;

    map.into_iter()
        .map(|(name, value)| match value {
            serde_json::Value::String(s) => Ok((name, s)),
            serde_json::Value::Number(_) | serde_json::Value::Bool(_) => {
                Ok((name, value.to_string()))
            }
            _ => Err(format!("header {name:?} must be a string, number or boolean")),
        })
        .collect()
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got {s:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing header name in {s:?}"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
