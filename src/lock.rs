use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Result, TfsaError};

/// Exclusive advisory lock for one sandbox service.
///
/// Held for the whole workflow; the OS drops it with the file handle, so a
/// crashed run never leaves a stale lock behind.
#[derive(Debug)]
pub struct SandboxLock {
    file: File,
    path: PathBuf,
}

impl SandboxLock {
    pub fn acquire(lock_dir: &Path, sandbox_id: &str, service: &str) -> Result<Self> {
        std::fs::create_dir_all(lock_dir)?;
        let path = lock_dir.join(format!("{}-{}.lock", sandbox_id, service));

        // Don't truncate before holding the lock; the pid belongs to the holder
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        file.try_lock_exclusive().map_err(|_| TfsaError::Locked {
            scope: format!("{}/{}", sandbox_id, service),
        })?;

        let mut file = file;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;

        tracing::debug!(path = %path.display(), "sandbox lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SandboxLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release sandbox lock");
        }
    }
}
