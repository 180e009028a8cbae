use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::sanitize;
use crate::error::{Result, TfsaError};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Runs the terraform binary that lives in a working directory.
///
/// Returns the raw combined output on success. Every failure, including a
/// non-zero exit, is a [`TfsaError::Execution`] with sanitized detail.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, args: &[String], working_dir: &Path) -> Result<String>;
}

pub fn binary_name() -> &'static str {
    if cfg!(windows) { "terraform.exe" } else { "terraform" }
}

pub fn binary_path(working_dir: &Path) -> PathBuf {
    working_dir.join(binary_name())
}

#[derive(Debug, Clone)]
pub struct TerraformCli {
    timeout: Duration,
}

impl TerraformCli {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TerraformCli {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl ProcessRunner for TerraformCli {
    async fn run(&self, args: &[String], working_dir: &Path) -> Result<String> {
        let command = args.first().cloned().unwrap_or_default();

        if !working_dir.is_dir() {
            return Err(TfsaError::config(format!(
                "working directory {} does not exist",
                working_dir.display()
            )));
        }

        let binary = binary_path(working_dir);

        // stdout and stderr share one file so interleaving is preserved
        let sink = tempfile::tempfile()?;
        let mut cmd = tokio::process::Command::new(&binary);
        cmd.args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(sink.try_clone()?)
            .stderr(sink.try_clone()?)
            .kill_on_drop(true);

        tracing::debug!(binary = %binary.display(), ?args, "spawning terraform");

        let mut child = cmd.spawn().map_err(|e| TfsaError::Execution {
            command: command.clone(),
            detail: sanitize::clean(&format!("failed to launch {}: {}", binary.display(), e))
                .into_owned(),
        })?;

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(waited) => waited.map_err(|e| TfsaError::Execution {
                command: command.clone(),
                detail: sanitize::clean(&e.to_string()).into_owned(),
            })?,
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to kill timed out terraform");
                }
                return Err(TfsaError::Execution {
                    command,
                    detail: format!("timed out after {}s", self.timeout.as_secs()),
                });
            }
        };

        let output = read_sink(sink).await?;
        tracing::debug!(command = %command, exit = ?status.code(), "terraform exited");

        if status.success() {
            return Ok(output);
        }

        tracing::warn!(command = %command, status = %status, "terraform exited non-zero");
        Err(TfsaError::Execution {
            command,
            detail: sanitize::clean(&output).into_owned(),
        })
    }
}

async fn read_sink(sink: std::fs::File) -> Result<String> {
    let mut file = tokio::fs::File::from_std(sink);
    file.seek(SeekFrom::Start(0)).await?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
