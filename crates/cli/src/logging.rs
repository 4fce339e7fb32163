//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `SCRIPTVISOR_LOG` environment variable, any `EnvFilter` directive
//!    (e.g. "debug" or "sv_core=trace,info")
//! 3. default to `info`
//!
//! Logs go to stderr; stdout carries script output only.

use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "SCRIPTVISOR_LOG";

/// Install the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) {
    fmt()
        .with_env_filter(build_filter(cli_level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn build_filter(cli_level: Option<LogLevel>) -> EnvFilter {
    match cli_level {
        Some(level) => EnvFilter::new(level.as_str()),
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flag_sets_filter() {
        assert_eq!(build_filter(Some(LogLevel::Debug)).to_string(), "debug");
        assert_eq!(build_filter(Some(LogLevel::Warn)).to_string(), "warn");
    }

    #[test]
    fn test_per_target_directives_parse() {
        let filter = EnvFilter::try_new("sv_core=trace,info").unwrap();
        let rendered = filter.to_string();
        assert!(rendered.contains("sv_core=trace"));
        assert!(rendered.contains("info"));
    }
}
