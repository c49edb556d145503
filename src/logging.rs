// src/logging.rs

//! Tracing subscriber setup.
//!
//! `--log-level` wins when given and applies to every target. Otherwise the
//! `CLUSTERDAG_LOG` variable is read as an `EnvFilter` directive string, so
//! both `debug` and `clusterdag::engine=trace,info` work. Without either the
//! filter is `info`.
//!
//! Output goes to stderr; stdout is reserved for job summaries and dry-run
//! plans.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "CLUSTERDAG_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    let filter = build_filter(cli_level, env.as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("installing tracing subscriber: {e}"))
}

/// The directive string the subscriber will be built from.
pub fn filter_directive(cli_level: Option<LogLevel>, env: Option<&str>) -> String {
    if let Some(level) = cli_level {
        return level.as_str().to_string();
    }
    match env.map(str::trim) {
        Some(s) if !s.is_empty() && EnvFilter::try_new(s).is_ok() => s.to_string(),
        _ => DEFAULT_DIRECTIVE.to_string(),
    }
}

fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> EnvFilter {
    EnvFilter::try_new(filter_directive(cli_level, env))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}
