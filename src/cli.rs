// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::parse_duration;

/// Command-line arguments for `loadbatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "loadbatch",
    version,
    about = "Run load-test executions through an external load tool and track them to completion.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `loadbatch.toml` in the current working directory if it
    /// exists, built-in defaults otherwise.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `LOADBATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the submissions and print the load tool command lines without
    /// running anything.
    #[arg(long)]
    pub dry_run: bool,

    /// How often to log the status of every execution while waiting.
    #[arg(long, value_name = "DURATION", default_value = "10s", value_parser = parse_duration)]
    pub status_every: Duration,

    /// Submission files (JSON), one execution each.
    #[arg(value_name = "SPEC", required = true)]
    pub specs: Vec<PathBuf>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_specs() {
        let args = CliArgs::try_parse_from([
            "loadbatch",
            "--config",
            "custom.toml",
            "--status-every",
            "500ms",
            "--dry-run",
            "a.json",
            "b.json",
        ])
        .unwrap();

        assert_eq!(args.config, Some(PathBuf::from("custom.toml")));
        assert_eq!(args.status_every, Duration::from_millis(500));
        assert!(args.dry_run);
        assert_eq!(args.specs.len(), 2);
    }

    #[test]
    fn at_least_one_spec_is_required() {
        assert!(CliArgs::try_parse_from(["loadbatch"]).is_err());
        assert!(CliArgs::try_parse_from(["loadbatch", "--status-every", "soon", "a.json"]).is_err());
    }
}
