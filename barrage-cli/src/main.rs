use anyhow::{Context, Result};
use barrage::{build_report, start_run, NoData, Report};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::process::ExitCode;
#[allow(unused)]
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;

use cli::{Cli, OutputFormat};

const DEFAULT_LOG_FILTER: &str = "barrage=info";
const HISTOGRAM_WIDTH: u64 = 40;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(addr) = cli.prometheus {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .with_context(|| format!("Unable to serve Prometheus metrics on {addr}"))?;
        info!("Serving Prometheus metrics on {addr}");
    }

    let config = cli.to_config();
    debug!(?config, "Parsed configuration");

    let results = start_run(config)?.await?;

    match build_report(&results) {
        Ok(report) => {
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Summary => {
                    println!("{report}");
                    print_histogram(&report, cli.bins);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(NoData) => {
            println!("No results generated from the test.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_histogram(report: &Report, bins: usize) {
    let histogram = report.latency_histogram(bins);
    let Some(tallest) = histogram.iter().map(|bin| bin.count).max().filter(|n| *n > 0) else {
        return;
    };

    println!("\nLatency distribution (ms):");
    for bin in histogram {
        let bar = "#".repeat((bin.count * HISTOGRAM_WIDTH / tallest) as usize);
        println!(
            "{:>10.2} - {:<10.2} {:>6} {:<10} {bar}",
            bin.start,
            bin.end,
            bin.count,
            format!("{:?}", bin.band),
        );
    }
}
