use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::ArchiveError;
use crate::platform::shell;

/// A compressed archive written to the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveArtifact {
    pub filename: String,
    pub local_path: PathBuf,
    /// Size at creation time. Validation re-stats the file instead of trusting this.
    pub size_bytes: u64,
}

/// Produces one archive of `source_dir` at `staging_dir/filename`.
pub trait Archiver: Send + Sync {
    fn create(
        &self,
        source_dir: &Path,
        staging_dir: &Path,
        filename: &str,
    ) -> Result<ArchiveArtifact, ArchiveError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSettings {
    pub tar_binary: String,
    pub timeout: Duration,
}

/// Shells out to `tar -cpzf` (gzip, permissions preserved).
pub struct TarArchiver {
    settings: ArchiveSettings,
}

impl TarArchiver {
    pub fn new(settings: ArchiveSettings) -> Self {
        Self { settings }
    }

    fn command(&self, source_dir: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.settings.tar_binary);
        cmd.arg("-cpzf")
            .arg(output)
            .arg("-C")
            .arg(source_dir)
            .arg(".");
        cmd
    }
}

impl Archiver for TarArchiver {
    fn create(
        &self,
        source_dir: &Path,
        staging_dir: &Path,
        filename: &str,
    ) -> Result<ArchiveArtifact, ArchiveError> {
        std::fs::create_dir_all(staging_dir).map_err(|source| ArchiveError::Staging {
            path: staging_dir.to_path_buf(),
            source,
        })?;

        let local_path = staging_dir.join(filename);
        let started = Instant::now();
        let mut cmd = self.command(source_dir, &local_path);

        let output = shell::run_command_with_timeout(&mut cmd, self.settings.timeout).map_err(
            |source| {
                if source.kind() == std::io::ErrorKind::TimedOut {
                    // Killed mid-write: the output is truncated.
                    if std::fs::remove_file(&local_path).is_ok() {
                        warn!(path = %local_path.display(), "removed partial archive");
                    }
                    ArchiveError::Timeout(self.settings.timeout)
                } else {
                    ArchiveError::Spawn {
                        program: self.settings.tar_binary.clone(),
                        source,
                    }
                }
            },
        )?;

        // tar exits non-zero for warnings such as "file changed as we read it"
        // after writing a usable archive, so the output is left for upload.
        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(ArchiveError::Exit {
                code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if !output.stderr.is_empty() {
            warn!(
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "archive command reported warnings"
            );
        }

        let size_bytes = std::fs::metadata(&local_path)
            .map_err(|source| ArchiveError::Output {
                path: local_path.clone(),
                source,
            })?
            .len();

        info!(
            path = %local_path.display(),
            bytes = size_bytes,
            duration = ?started.elapsed(),
            "archive created"
        );

        Ok(ArchiveArtifact {
            filename: filename.to_string(),
            local_path,
            size_bytes,
        })
    }
}
