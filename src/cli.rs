// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `clusterdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "clusterdag",
    version,
    about = "Turn cluster lifecycle commands into dependency-ordered jobs and run them on host agents.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Clusterdag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Clusterdag.toml")]
    pub config: String,

    /// JSON file holding one command or an array of commands, run in order.
    ///
    /// Commands without a `cluster_id` target the cluster most recently
    /// created by an earlier command in the same file.
    #[arg(long, value_name = "PATH")]
    pub command: String,

    /// Validate and print each job's stage/task plan; the agent runs nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Retry a failed job up to N times.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub retries: u32,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CLUSTERDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
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

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
