use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tokio::io::AsyncWriteExt;
use tracing::Level;

use super::command::CommandKind;
use super::sanitize;

/// Transcript log for one workflow invocation.
///
/// The file is created lazily on the first record and appended to afterwards.
/// Write failures are reported through `tracing` and never abort a workflow.
#[derive(Debug, Clone)]
pub struct ExecLog {
    path: PathBuf,
}

impl ExecLog {
    pub fn new(log_dir: &Path, sandbox_id: &str) -> Self {
        Self::created_at(log_dir, sandbox_id, Local::now())
    }

    pub fn created_at(log_dir: &Path, sandbox_id: &str, created: DateTime<Local>) -> Self {
        let file_name = format!("TF_EXEC_LOG_{}.log", created.format("%d_%m_%y-%H_%M_%S"));
        Self {
            path: log_dir.join(sandbox_id).join(file_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(&self, command: CommandKind, text: &str, level: Level) {
        if let Err(e) = self.append(&render_entry(command, text, level)).await {
            tracing::warn!(
                path = %self.path.display(),
                command = %command,
                error = %e,
                "failed to write terraform exec log"
            );
        }
    }

    async fn append(&self, entry: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(entry.as_bytes()).await?;
        file.flush().await
    }
}

fn render_entry(command: CommandKind, text: &str, level: Level) -> String {
    let stamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    let body = sanitize::clean(text);
    let newline = if body.ends_with('\n') || body.is_empty() { "" } else { "\n" };
    format!(
        "{stamp} {level} ---[ {command} START ]---\n{body}{newline}{stamp} {level} ---[ {command} END ]---\n"
    )
}
