//! quotegate - fetch stock data through a rate-limited, retrying cache
//!
//! Fetches a time series for each symbol given on the command line, at most
//! a configured number at a time, retrying transient failures with backoff
//! and reusing fresh results from earlier runs via the cache snapshot.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{info, warn};

use quotegate::cli::{Cli, StartupConfig};
use quotegate::{AlphaVantageClient, CacheSnapshot, FetchCoordinator, FetchReport};

/// Sets up the logger; `RUST_LOG` wins over the `-v` count
fn init_logging(config: &StartupConfig) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.log_level);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    builder.init();
}

/// Prints one line (or the whole payload) per fetch
fn print_report(report: &FetchReport, print_payloads: bool) {
    match &report.result {
        Ok(payload) if print_payloads => println!("{}", payload),
        Ok(payload) => {
            let source = if report.from_cache {
                "cache".to_string()
            } else {
                format!("{} attempt(s)", report.attempts.len())
            };
            println!(
                "{:<8} ok     {:>9} bytes  ({}, {:?})",
                report.key,
                payload.len(),
                source,
                report.elapsed
            );
        }
        Err(e) => println!("{:<8} error  {}", report.key, e),
    }
}

async fn run(config: StartupConfig) -> Result<bool, Box<dyn std::error::Error>> {
    let mut upstream = AlphaVantageClient::new(config.api_key.clone())?;
    if let Some(base_url) = &config.app.base_url {
        upstream = upstream.with_base_url(base_url.clone());
    }
    if let Some(function) = &config.app.function {
        upstream = upstream.with_function(function.clone());
    }

    let coordinator = FetchCoordinator::new(Arc::new(upstream), &config.app.fetch)?;

    let snapshot = if config.use_snapshot {
        match &config.app.snapshot_dir {
            Some(dir) => Some(CacheSnapshot::with_dir(dir)),
            None => CacheSnapshot::new(),
        }
    } else {
        None
    };

    if let Some(snapshot) = &snapshot {
        match snapshot.read_into(coordinator.cache()) {
            Ok(restored) => info!("restored {} cached responses", restored),
            Err(e) => warn!("ignoring unreadable cache snapshot: {}", e),
        }
    }

    let reports = coordinator.fetch_many(&config.symbols).await;
    for report in &reports {
        print_report(report, config.print_payloads);
    }

    if let Some(snapshot) = &snapshot {
        if let Err(e) = snapshot.write(coordinator.cache()) {
            warn!("failed to save cache snapshot: {}", e);
        }
    }

    let stats = coordinator.stats();
    info!(
        "{} hits, {} misses, {} upstream attempts, {} retries",
        stats.cache_hits, stats.cache_misses, stats.upstream_attempts, stats.retries
    );

    Ok(reports.iter().all(|report| report.result.is_ok()))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match StartupConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };
    init_logging(&config);

    match run(config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
