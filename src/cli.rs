//! Command-line interface parsing for quotegate
//!
//! This module handles parsing of CLI arguments using clap and merges them
//! with the config file into the settings the binary starts with.

use clap::{ArgAction, Parser};
use log::LevelFilter;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::{AppConfig, ConfigError};

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The symbol contains characters a ticker never has
    #[error("Invalid symbol: '{0}'. Symbols may contain letters, digits, '.' and '-'")]
    InvalidSymbol(String),

    /// No API key on the command line, in the environment, or in the config file
    #[error("No API key given. Pass --api-key, set ALPHAVANTAGE_API_KEY, or add api_key to the config file")]
    MissingApiKey,

    /// The config file could not be used
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// quotegate - fetch stock data through a rate-limited, retrying cache
#[derive(Parser, Debug)]
#[command(name = "quotegate")]
#[command(about = "Fetch stock time series through a rate-limited, retrying cache")]
#[command(version)]
pub struct Cli {
    /// Ticker symbols to fetch
    ///
    /// Examples:
    ///   quotegate IBM
    ///   quotegate IBM MSFT BRK.B --print
    #[arg(value_name = "SYMBOL", required = true)]
    pub symbols: Vec<String>,

    /// AlphaVantage API key
    #[arg(long, env = "ALPHAVANTAGE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Maximum simultaneous upstream calls
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Total attempts per symbol, the first one included
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// How long fetched data stays cached, in seconds
    #[arg(long, value_name = "SECS")]
    pub ttl_secs: Option<u64>,

    /// Do not read or write the on-disk cache snapshot
    #[arg(long)]
    pub no_snapshot: bool,

    /// Print each payload instead of a one-line summary
    #[arg(long)]
    pub print: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Settings derived from CLI arguments and the config file
#[derive(Debug, Clone)]
pub struct StartupConfig {
    /// Normalized, de-duplicated symbols in the order given
    pub symbols: Vec<String>,
    /// Credential for the upstream
    pub api_key: String,
    /// Config file contents with CLI overrides applied
    pub app: AppConfig,
    /// Whether to restore and save the cache snapshot
    pub use_snapshot: bool,
    /// Whether to print payloads
    pub print_payloads: bool,
    /// Log level for the logger backend
    pub log_level: LevelFilter,
}

/// Validates and normalizes a ticker symbol to upper case.
///
/// # Returns
/// * `Ok(String)` with the upper-cased symbol
/// * `Err(CliError::InvalidSymbol)` if it is empty or has illegal characters
pub fn parse_symbol_arg(s: &str) -> Result<String, CliError> {
    let trimmed = s.trim();
    let valid = !trimmed.is_empty()
        && trimmed.len() <= 16
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if valid {
        Ok(trimmed.to_ascii_uppercase())
    } else {
        Err(CliError::InvalidSymbol(s.to_string()))
    }
}

/// Maps the `-v` count to a log level
pub fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

impl StartupConfig {
    /// Builds startup settings from parsed arguments and an already loaded config.
    ///
    /// Symbols are validated first so a bad symbol is reported even when no
    /// API key is configured.
    pub fn from_parts(cli: &Cli, mut app: AppConfig) -> Result<Self, CliError> {
        let mut symbols: Vec<String> = Vec::with_capacity(cli.symbols.len());
        for raw in &cli.symbols {
            let symbol = parse_symbol_arg(raw)?;
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }

        if let Some(concurrency) = cli.concurrency {
            app.fetch.max_concurrent_upstream_calls = concurrency;
        }
        if let Some(retries) = cli.retries {
            app.fetch.max_retry_attempts = retries;
        }
        if let Some(ttl_secs) = cli.ttl_secs {
            app.fetch.cache_ttl_secs = ttl_secs;
        }
        app.fetch.validate()?;

        let non_blank = |key: &String| !key.trim().is_empty();
        let api_key = cli
            .api_key
            .clone()
            .filter(non_blank)
            .or_else(|| app.api_key.clone().filter(non_blank))
            .ok_or(CliError::MissingApiKey)?;

        Ok(StartupConfig {
            symbols,
            api_key,
            app,
            use_snapshot: !cli.no_snapshot,
            print_payloads: cli.print,
            log_level: log_level(cli.verbose),
        })
    }

    /// Builds startup settings, loading the config file named by `--config`
    /// or the default one if it exists.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let app = AppConfig::load_or_default(cli.config.as_deref())?;
        Self::from_parts(cli, app)
    }
}
