//! Integration tests for CLI argument handling
//!
//! Runs the quotegate binary and checks argument validation and exit codes.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use tempfile::TempDir;

/// Helper to run the CLI with given args and capture output
///
/// The API key variable is cleared so the host environment cannot leak in.
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_quotegate"))
        .args(args)
        .env_remove("ALPHAVANTAGE_API_KEY")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute quotegate")
}

/// Writes a config file into a fresh temp dir
fn write_config(contents: &str) -> (PathBuf, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("config.toml");
    fs::write(&path, contents).expect("Should write config");
    (path, temp_dir)
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(output.status.success(), "Expected --help to exit successfully");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("quotegate"), "Help should mention quotegate");
    assert!(stdout.contains("--concurrency"), "Help should mention --concurrency");
    assert!(stdout.contains("SYMBOL"), "Help should mention symbols");
}

#[test]
fn test_missing_symbols_is_rejected() {
    let output = run_cli(&[]);
    assert!(!output.status.success());
}

#[test]
fn test_invalid_symbol_prints_error_and_exits() {
    let (config, _dir) = write_config("");
    let config = config.to_string_lossy();
    let output = run_cli(&["--config", &config, "IBM;DROP"]);
    assert!(!output.status.success(), "Expected invalid symbol to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Invalid symbol"),
        "Should print error message about the symbol: {}",
        stderr
    );
}

#[test]
fn test_missing_api_key_prints_error_and_exits() {
    let (config, _dir) = write_config("[fetch]\nmax_retry_attempts = 1\n");
    let config = config.to_string_lossy();
    let output = run_cli(&["--config", &config, "IBM"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("API key"), "stderr: {}", stderr);
}

#[test]
fn test_missing_explicit_config_file_is_an_error() {
    let output = run_cli(&["--config", "/nonexistent/quotegate.toml", "--api-key", "demo", "IBM"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("config file"), "stderr: {}", stderr);
}

#[test]
fn test_invalid_config_values_are_rejected() {
    let (config, _dir) = write_config("");
    let config = config.to_string_lossy();
    let output = run_cli(&["--config", &config, "--api-key", "demo", "--concurrency", "0", "IBM"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("max_concurrent_upstream_calls"), "stderr: {}", stderr);
}

#[test]
fn test_unreachable_upstream_reports_failure_per_symbol() {
    let (config, _dir) = write_config(
        "base_url = \"http://127.0.0.1:9/query\"\n\n[fetch]\nmax_retry_attempts = 1\n",
    );
    let config = config.to_string_lossy();
    let output = run_cli(&[
        "--config",
        &config,
        "--api-key",
        "demo",
        "--no-snapshot",
        "ibm",
        "msft",
    ]);

    assert!(!output.status.success(), "failed fetches should fail the run");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("IBM"), "stdout: {}", stdout);
    assert!(stdout.contains("MSFT"), "stdout: {}", stdout);
    assert!(stdout.contains("retries exhausted after 1 attempts"), "stdout: {}", stdout);
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use clap::Parser;
    use quotegate::cli::{parse_symbol_arg, Cli, StartupConfig};
    use quotegate::AppConfig;

    #[test]
    fn test_cli_collects_symbols_in_order() {
        let cli = Cli::parse_from(["quotegate", "msft", "ibm"]);
        assert_eq!(cli.symbols, vec!["msft", "ibm"]);
    }

    #[test]
    fn test_parse_symbol_arg_accepts_share_classes() {
        assert_eq!(parse_symbol_arg("brk.a").unwrap(), "BRK.A");
    }

    #[test]
    fn test_parse_symbol_arg_invalid_returns_error() {
        assert!(parse_symbol_arg("../etc").is_err());
    }

    #[test]
    fn test_startup_config_uses_file_settings() {
        let cli = Cli {
            api_key: Some("demo".to_string()),
            ..Cli::parse_from(["quotegate", "ibm"])
        };
        let app = AppConfig::from_toml("snapshot_dir = \"/tmp/qg\"\n[fetch]\ncache_ttl_secs = 5\n")
            .expect("config should parse");

        let config = StartupConfig::from_parts(&cli, app).expect("config should build");
        assert_eq!(config.app.fetch.cache_ttl_secs, 5);
        assert_eq!(
            config.app.snapshot_dir.as_deref(),
            Some(std::path::Path::new("/tmp/qg"))
        );
        assert!(config.use_snapshot);
    }
}
