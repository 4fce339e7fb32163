//! Optional copy of a run's output on disk.

use anyhow::Context;
use std::path::{Path, PathBuf};
use sv_protocol::ipc::StreamEvent;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Prefix marking stderr lines, both in output files and SSE frames.
pub const STDERR_PREFIX: &str = "[ERROR] ";

/// Appends every output line of one run to a log file.
///
/// A failed write disables the tee; the stream itself is unaffected.
#[derive(Debug)]
pub struct OutputTee {
    path: PathBuf,
    file: Option<File>,
}

impl OutputTee {
    /// Create (or append to) the output file, creating parent directories.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| {
                    format!("Failed to create output directory {}", parent.display())
                })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open output file {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    pub async fn write(&mut self, event: &StreamEvent) {
        let line = match event {
            StreamEvent::Stdout { text } => format!("{text}\n"),
            StreamEvent::Stderr { text } => format!("{STDERR_PREFIX}{text}\n"),
            StreamEvent::End { .. } => return,
        };
        let Some(file) = self.file.as_mut() else {
            return;
        };
        if let Err(e) = file.write_all(line.as_bytes()).await {
            warn!(
                path = %self.path.display(),
                error = %e,
                "output file write failed, disabling persistence"
            );
            self.file = None;
        }
    }

    pub async fn finish(&mut self) {
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.flush().await {
                warn!(path = %self.path.display(), error = %e, "output file flush failed");
            }
        }
    }
}
