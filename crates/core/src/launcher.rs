//! Script materialization and process construction.
//!
//! The launcher writes a script's content into a fresh scratch directory
//! and builds (without starting) the command that runs it. Which
//! interpreter is used is decided by a per-[`ScriptType`] strategy table,
//! so new script types only touch this table, never the supervisor.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use sv_protocol::config_models::{LaunchStrategy, SupervisorConfig};
use sv_protocol::script_models::{ScriptSource, ScriptType};
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{SupervisorError, SupervisorResult};

/// Prefix of every scratch directory.
pub const SCRATCH_PREFIX: &str = "script-";

/// Builds runnable processes from script sources.
#[derive(Debug, Clone)]
pub struct Launcher {
    strategies: BTreeMap<ScriptType, LaunchStrategy>,
    scratch_root: Option<PathBuf>,
    keep_scratch: bool,
}

impl Launcher {
    /// Create a launcher with the effective strategy of every script type.
    pub fn new(config: &SupervisorConfig) -> Self {
        let strategies = ScriptType::ALL
            .into_iter()
            .map(|t| (t, config.launch_strategy(t)))
            .collect();

        Self {
            strategies,
            scratch_root: config.scratch_root.clone(),
            keep_scratch: config.keep_scratch,
        }
    }

    pub fn strategy(&self, script_type: ScriptType) -> Option<&LaunchStrategy> {
        self.strategies.get(&script_type)
    }

    /// Materialize `script` and construct its process.
    ///
    /// # Errors
    ///
    /// - `UnsupportedScriptType` if the declared type is unknown or has no
    ///   strategy
    /// - `SpawnFailure` if the interpreter is not installed or the scratch
    ///   directory cannot be created or written
    ///
    /// No scratch directory is left behind when an error is returned.
    pub async fn prepare(
        &self,
        script: &ScriptSource,
        args: &[String],
    ) -> SupervisorResult<PreparedLaunch> {
        let script_type: ScriptType = script
            .script_type
            .parse()
            .map_err(|_| SupervisorError::UnsupportedScriptType(script.script_type.clone()))?;

        let strategy = self
            .strategy(script_type)
            .ok_or_else(|| SupervisorError::UnsupportedScriptType(script_type.to_string()))?;

        let program = which::which(&strategy.program).map_err(|e| {
            SupervisorError::SpawnFailure(format!(
                "interpreter '{}' not available: {e}",
                strategy.program
            ))
        })?;

        let temp_dir = self.create_scratch()?;
        let script_path = temp_dir.path().join(&strategy.file_name);
        tokio::fs::write(&script_path, &script.content).await.map_err(|e| {
            SupervisorError::SpawnFailure(format!(
                "cannot write script file {}: {e}",
                script_path.display()
            ))
        })?;

        let mut command = Command::new(&program);
        command
            .args(&strategy.args)
            .arg(&script_path)
            .args(args)
            .current_dir(temp_dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so signals reach the interpreter's children too.
        #[cfg(unix)]
        command.process_group(0);

        let scratch = if self.keep_scratch {
            ScratchDir::Persistent(temp_dir.into_path())
        } else {
            ScratchDir::Temporary(temp_dir)
        };

        debug!(
            script_id = %script.id,
            script_type = %script_type,
            program = %program.display(),
            scratch = %scratch.path().display(),
            "prepared script launch"
        );

        Ok(PreparedLaunch {
            command,
            scratch,
            script_type,
        })
    }

    fn create_scratch(&self) -> SupervisorResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let created = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        created.map_err(|e| {
            SupervisorError::SpawnFailure(format!("cannot create scratch directory: {e}"))
        })
    }
}

/// Scratch directory holding a materialized script.
#[derive(Debug)]
pub enum ScratchDir {
    /// Removed when dropped.
    Temporary(TempDir),
    /// Left on disk (`keep_scratch = true`).
    Persistent(PathBuf),
}

impl ScratchDir {
    pub fn path(&self) -> &Path {
        match self {
            ScratchDir::Temporary(dir) => dir.path(),
            ScratchDir::Persistent(path) => path,
        }
    }
}

/// A constructed but not yet started script process.
#[derive(Debug)]
pub struct PreparedLaunch {
    command: Command,
    scratch: ScratchDir,
    script_type: ScriptType,
}

impl PreparedLaunch {
    pub fn script_type(&self) -> ScriptType {
        self.script_type
    }

    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Start the OS process.
    ///
    /// On failure the scratch directory is dropped with `self`.
    pub fn spawn(mut self) -> std::io::Result<StartedProcess> {
        let child = self.command.spawn()?;
        Ok(StartedProcess {
            child,
            scratch: self.scratch,
        })
    }
}

/// A started process together with the scratch directory it runs from.
#[derive(Debug)]
pub struct StartedProcess {
    pub child: Child,
    pub scratch: ScratchDir,
}
