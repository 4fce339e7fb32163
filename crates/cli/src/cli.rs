//! Command-line interface definition.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(
    name = "scriptvisor",
    version,
    about = "Run scripts under supervision and stream their output"
)]
pub struct Cli {
    /// Directory containing `.scriptvisor/` (defaults to the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Log level (overrides SCRIPTVISOR_LOG)
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a script file and stream its output until it ends
    Run {
        /// Script file to run
        file: PathBuf,

        /// Script type (python, golang, shell); inferred from the extension when omitted
        #[arg(long = "type", short = 't')]
        script_type: Option<String>,

        /// How stream events are printed
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Arguments passed to the script
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Stop a running process, including one started by another invocation
    Stop {
        process_id: Uuid,
    },

    /// List processes started by the local user
    List {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one process record
    Show {
        process_id: Uuid,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Script output as-is, stderr lines on stderr
    Text,
    /// One JSON stream event per line
    Json,
    /// Server-sent-event frames
    Sse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_arguments_after_separator() {
        let cli = Cli::try_parse_from([
            "scriptvisor",
            "run",
            "job.py",
            "--format",
            "sse",
            "--",
            "--flag",
            "x",
        ])
        .unwrap();
        match cli.command {
            Command::Run {
                file,
                script_type,
                format,
                args,
            } => {
                assert_eq!(file, PathBuf::from("job.py"));
                assert!(script_type.is_none());
                assert_eq!(format, OutputFormat::Sse);
                assert_eq!(args, vec!["--flag".to_string(), "x".to_string()]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "scriptvisor",
            "list",
            "--root",
            "/tmp/x",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/x")));
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
    }

    #[test]
    fn test_stop_requires_uuid() {
        assert!(Cli::try_parse_from(["scriptvisor", "stop", "not-a-uuid"]).is_err());
    }
}
