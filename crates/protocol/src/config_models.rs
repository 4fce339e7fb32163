//! Supervisor configuration models for `.scriptvisor/config.toml`.
//!
//! Every field has a default so an absent or empty file yields a usable
//! configuration.
//!
//! # Example
//!
//! ```toml
//! # .scriptvisor/config.toml
//! output_dir = "logs"
//! stop_grace_period_ms = 2000
//!
//! [launchers.python]
//! program = "python3.12"
//! file_name = "main.py"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use ts_rs::TS;

use crate::script_models::ScriptType;

/// How to turn a script file into a running process.
///
/// The process is started as `program [args...] <scratch>/<file_name> [user args...]`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct LaunchStrategy {
    /// Interpreter or toolchain executable, looked up on `PATH`.
    pub program: String,

    /// Arguments placed before the script path, e.g. `["run"]` for `go`.
    #[serde(default)]
    pub args: Vec<String>,

    /// File name the script content is written to inside the scratch directory.
    pub file_name: String,
}

impl LaunchStrategy {
    pub fn new(program: &str, args: &[&str], file_name: &str) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            file_name: file_name.to_string(),
        }
    }

    /// Built-in strategy for a script type.
    pub fn default_for(script_type: ScriptType) -> Self {
        match script_type {
            ScriptType::Python => Self::new("python3", &[], "script.py"),
            ScriptType::Golang => Self::new("go", &["run"], "script.go"),
            ScriptType::Shell => Self::new("sh", &[], "script.sh"),
        }
    }
}

/// Settings for the script execution supervisor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Parent directory for per-run scratch directories.
    ///
    /// Defaults to the system temporary directory.
    #[ts(type = "string | null")]
    pub scratch_root: Option<PathBuf>,

    /// Keep scratch directories after a run terminates.
    pub keep_scratch: bool,

    /// Directory holding one JSON document per process record.
    #[ts(type = "string")]
    pub state_dir: PathBuf,

    /// When set, each run's output is also written to `<output_dir>/<id>.log`.
    #[ts(type = "string | null")]
    pub output_dir: Option<PathBuf>,

    /// Capacity of the per-run output channel.
    pub channel_capacity: usize,

    /// How long a stopped process may ignore SIGTERM before it is killed.
    pub stop_grace_period_ms: u64,

    /// How long to wait for buffered output after the process exits.
    pub drain_timeout_ms: u64,

    /// Per-type overrides of the built-in launch strategies.
    pub launchers: BTreeMap<ScriptType, LaunchStrategy>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            scratch_root: None,
            keep_scratch: false,
            state_dir: PathBuf::from(".scriptvisor/processes"),
            output_dir: None,
            channel_capacity: 256,
            stop_grace_period_ms: 5_000,
            drain_timeout_ms: 2_000,
            launchers: BTreeMap::new(),
        }
    }
}

impl SupervisorConfig {
    /// Effective launch strategy for a type: the configured override, or
    /// the built-in default.
    pub fn launch_strategy(&self, script_type: ScriptType) -> LaunchStrategy {
        self.launchers
            .get(&script_type)
            .cloned()
            .unwrap_or_else(|| LaunchStrategy::default_for(script_type))
    }
}
