//! Staging of the module and terraform binary, and removal of what was staged.
//!
//! Every staged working directory is recorded together with the staging root
//! that owns it, so cleanup deletes exactly that root and nothing above it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Result, TfsaError};
use crate::status::SandboxData;
use crate::terraform::runner;

pub const REPO_DIR: &str = "REPO";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedModule {
    pub working_dir: PathBuf,
    pub staging_root: PathBuf,
}

/// Produces a fresh working directory containing the module and binary.
#[async_trait]
pub trait ModuleStager: Send + Sync {
    async fn stage(&self) -> Result<StagedModule>;
}

/// Stages from a local module checkout and a local terraform binary.
#[derive(Debug, Clone)]
pub struct LocalStager {
    module_dir: PathBuf,
    terraform_bin: PathBuf,
    staging_parent: PathBuf,
}

impl LocalStager {
    pub fn new(
        module_dir: impl Into<PathBuf>,
        terraform_bin: impl Into<PathBuf>,
        staging_parent: impl Into<PathBuf>,
    ) -> Self {
        Self {
            module_dir: module_dir.into(),
            terraform_bin: terraform_bin.into(),
            staging_parent: staging_parent.into(),
        }
    }

    fn stage_blocking(&self) -> Result<StagedModule> {
        if !self.module_dir.is_dir() {
            return Err(TfsaError::config(format!(
                "module directory {} does not exist",
                self.module_dir.display()
            )));
        }
        if !self.terraform_bin.is_file() {
            return Err(TfsaError::config(format!(
                "terraform binary {} does not exist",
                self.terraform_bin.display()
            )));
        }

        let staging_root = self
            .staging_parent
            .join(format!("tfsa-{}", uuid::Uuid::new_v4()));
        let working_dir = staging_root.join(REPO_DIR);

        copy_dir_all(&self.module_dir, &working_dir)?;
        // fs::copy keeps the permission bits, so the binary stays executable
        std::fs::copy(&self.terraform_bin, runner::binary_path(&working_dir))?;

        Ok(StagedModule {
            working_dir,
            staging_root,
        })
    }
}

#[async_trait]
impl ModuleStager for LocalStager {
    async fn stage(&self) -> Result<StagedModule> {
        let stager = self.clone();
        let staged = tokio::task::spawn_blocking(move || stager.stage_blocking())
            .await
            .map_err(|e| TfsaError::Io(std::io::Error::other(e)))??;

        tracing::info!(
            working_dir = %staged.working_dir.display(),
            staging_root = %staged.staging_root.display(),
            "module staged"
        );
        Ok(staged)
    }
}

/// Used when no module source was given; only a recorded working dir can be used.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoModuleSource;

#[async_trait]
impl ModuleStager for NoModuleSource {
    async fn stage(&self) -> Result<StagedModule> {
        Err(TfsaError::config(
            "no working directory on record and no module source given to stage one",
        ))
    }
}

fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            // Local terraform state and plugin cache are never carried over
            if entry.file_name() == ".terraform" {
                continue;
            }
            copy_dir_all(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Reuses the recorded working directory when it still exists, otherwise stages a new one.
pub async fn prepare_working_dir(data: &SandboxData, stager: &dyn ModuleStager) -> Result<PathBuf> {
    if let Some(existing) = data.working_dir().await? {
        if existing.is_dir() {
            tracing::info!(working_dir = %existing.display(), "using existing working dir");
            return Ok(existing);
        }
        tracing::warn!(working_dir = %existing.display(), "recorded working dir is gone, staging again");
    }

    let staged = stager.stage().await?;
    data.set_staging(&staged.working_dir, &staged.staging_root)
        .await?;
    Ok(staged.working_dir)
}

/// Whether a usable local working directory is on record.
pub async fn has_working_dir(data: &SandboxData) -> Result<bool> {
    Ok(data
        .working_dir()
        .await?
        .is_some_and(|dir| dir.is_dir()))
}

/// Deletes the recorded staging root and clears the stored paths.
pub async fn remove_staging(data: &SandboxData) -> Result<()> {
    let working_dir = data.working_dir().await?;
    let staging_root = data.staging_root().await?;

    match (&working_dir, &staging_root) {
        (Some(working_dir), Some(root)) => {
            if !working_dir.starts_with(root) || working_dir == root {
                return Err(TfsaError::config(format!(
                    "refusing to delete {}: not a staging root of {}",
                    root.display(),
                    working_dir.display()
                )));
            }
            match tokio::fs::remove_dir_all(root).await {
                Ok(()) => tracing::info!(staging_root = %root.display(), "staging dir removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        (Some(working_dir), None) => {
            tracing::warn!(
                working_dir = %working_dir.display(),
                "no staging root recorded, leaving files in place"
            );
        }
        (None, _) => {}
    }

    data.clear_staging().await?;
    Ok(())
}
