//! Remote artifact synchronization

use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::{Error, Result};

/// Copies saved archives to remote storage.
pub trait RemoteSync {
    /// Push the archive at `archive` to the remote.
    ///
    /// # Errors
    ///
    /// Returns `RemoteSync` if the copy fails
    fn push(&self, archive: &Path) -> Result<()>;
}

/// No remote configured; pushing is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemote;

impl RemoteSync for NoRemote {
    fn push(&self, _archive: &Path) -> Result<()> {
        Ok(())
    }
}

/// Copies archives with `rclone copy <archive> <remote_dir>`.
#[derive(Debug, Clone)]
pub struct RcloneSync {
    program: String,
    remote_dir: String,
}

impl RcloneSync {
    /// Sync into `remote_dir` (e.g. `deepnc:/mods/models/`).
    #[must_use]
    pub fn new(remote_dir: impl Into<String>) -> Self {
        Self {
            program: "rclone".to_string(),
            remote_dir: remote_dir.into(),
        }
    }

    /// Use a different executable than `rclone` on `PATH`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Remote target directory.
    #[must_use]
    pub fn remote_dir(&self) -> &str {
        &self.remote_dir
    }
}

impl RemoteSync for RcloneSync {
    fn push(&self, archive: &Path) -> Result<()> {
        let output = Command::new(&self.program)
            .arg("copy")
            .arg(archive)
            .arg(&self.remote_dir)
            .output()
            .map_err(|e| Error::RemoteSync(format!("cannot run {}: {e}", self.program)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(
            archive = %archive.display(),
            remote = %self.remote_dir,
            %stdout,
            %stderr,
            "rclone copy finished"
        );

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::RemoteSync(format!(
                "{} copy {} {} exited with {}: {}",
                self.program,
                archive.display(),
                self.remote_dir,
                output.status,
                stderr.trim()
            )))
        }
    }
}
