//! Run status persisted per sandbox, and the gate deciding which workflow may run.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::store::{KeyValueStore, StoreError};

const EXECUTE_STATUS: &str = "EXECUTE_STATUS";
const DESTROY_STATUS: &str = "DESTROY_STATUS";
const TF_WORKING_DIR: &str = "TF_WORKING_DIR";
const TF_STAGING_ROOT: &str = "TF_STAGING_ROOT";
const TF_UUID: &str = "TF_UUID";

/// Outcome of the last execute workflow.
///
/// `InitFailed` and `PlanFailed` are recorded for diagnosis but gate like `None`:
/// nothing was applied, so execute stays open and destroy stays closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStatus {
    #[default]
    None,
    ApplyPassed,
    ApplyFailed,
    InitFailed,
    PlanFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DestroyStatus {
    #[default]
    None,
    DestroyPassed,
    DestroyFailed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::None => "NONE",
            ExecutionStatus::ApplyPassed => "APPLY_PASSED",
            ExecutionStatus::ApplyFailed => "APPLY_FAILED",
            ExecutionStatus::InitFailed => "INIT_FAILED",
            ExecutionStatus::PlanFailed => "PLAN_FAILED",
        }
    }

    /// An apply was attempted, so the deployment may hold live resources.
    pub fn has_applied(&self) -> bool {
        matches!(self, ExecutionStatus::ApplyPassed | ExecutionStatus::ApplyFailed)
    }

    pub fn is_pre_apply_failure(&self) -> bool {
        matches!(self, ExecutionStatus::InitFailed | ExecutionStatus::PlanFailed)
    }
}

impl DestroyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DestroyStatus::None => "NONE",
            DestroyStatus::DestroyPassed => "DESTROY_PASSED",
            DestroyStatus::DestroyFailed => "DESTROY_FAILED",
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "NONE" => Ok(ExecutionStatus::None),
            "APPLY_PASSED" => Ok(ExecutionStatus::ApplyPassed),
            "APPLY_FAILED" => Ok(ExecutionStatus::ApplyFailed),
            "INIT_FAILED" => Ok(ExecutionStatus::InitFailed),
            "PLAN_FAILED" => Ok(ExecutionStatus::PlanFailed),
            _ => Err(()),
        }
    }
}

impl FromStr for DestroyStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "NONE" => Ok(DestroyStatus::None),
            "DESTROY_PASSED" => Ok(DestroyStatus::DestroyPassed),
            "DESTROY_FAILED" => Ok(DestroyStatus::DestroyFailed),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for DestroyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of both status slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunStatus {
    pub execution: ExecutionStatus,
    pub destroy: DestroyStatus,
}

impl RunStatus {
    pub fn new(execution: ExecutionStatus, destroy: DestroyStatus) -> Self {
        Self { execution, destroy }
    }

    /// A failed apply must be destroyed first, and a deployment whose teardown
    /// failed is in an unknown state and must not be applied over.
    pub fn can_execute(&self) -> bool {
        if self.execution == ExecutionStatus::ApplyFailed {
            return false;
        }
        !(self.destroy == DestroyStatus::DestroyFailed
            && self.execution == ExecutionStatus::ApplyPassed)
    }

    /// Destroy needs a prior apply attempt, successful or not.
    pub fn can_destroy(&self) -> bool {
        self.execution.has_applied()
    }
}

/// Sandbox data for one Terraform service: status slots plus staging bookkeeping.
#[derive(Clone)]
pub struct SandboxData {
    store: Arc<dyn KeyValueStore>,
    scope: String,
}

impl SandboxData {
    pub fn new(store: Arc<dyn KeyValueStore>, scope: impl Into<String>) -> Self {
        Self {
            store,
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn key(&self, name: &str) -> String {
        format!("{}.{}", self.scope, name)
    }

    async fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        self.store.get(&self.key(name)).await
    }

    async fn set(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.store.set(&self.key(name), value).await
    }

    pub async fn execution_status(&self) -> Result<ExecutionStatus, StoreError> {
        let raw = self.get(EXECUTE_STATUS).await?.unwrap_or_default();
        raw.parse().map_err(|_| StoreError::InvalidValue {
            key: self.key(EXECUTE_STATUS),
            value: raw,
        })
    }

    pub async fn destroy_status(&self) -> Result<DestroyStatus, StoreError> {
        let raw = self.get(DESTROY_STATUS).await?.unwrap_or_default();
        raw.parse().map_err(|_| StoreError::InvalidValue {
            key: self.key(DESTROY_STATUS),
            value: raw,
        })
    }

    pub async fn set_execution_status(&self, status: ExecutionStatus) -> Result<(), StoreError> {
        tracing::debug!(scope = %self.scope, status = %status, "execution status");
        self.set(EXECUTE_STATUS, status.as_str()).await
    }

    pub async fn set_destroy_status(&self, status: DestroyStatus) -> Result<(), StoreError> {
        tracing::debug!(scope = %self.scope, status = %status, "destroy status");
        self.set(DESTROY_STATUS, status.as_str()).await
    }

    pub async fn run_status(&self) -> Result<RunStatus, StoreError> {
        Ok(RunStatus {
            execution: self.execution_status().await?,
            destroy: self.destroy_status().await?,
        })
    }

    pub async fn working_dir(&self) -> Result<Option<PathBuf>, StoreError> {
        Ok(non_empty_path(self.get(TF_WORKING_DIR).await?))
    }

    pub async fn staging_root(&self) -> Result<Option<PathBuf>, StoreError> {
        Ok(non_empty_path(self.get(TF_STAGING_ROOT).await?))
    }

    pub async fn set_staging(
        &self,
        working_dir: &std::path::Path,
        staging_root: &std::path::Path,
    ) -> Result<(), StoreError> {
        self.set(TF_STAGING_ROOT, &staging_root.to_string_lossy())
            .await?;
        self.set(TF_WORKING_DIR, &working_dir.to_string_lossy()).await
    }

    pub async fn clear_staging(&self) -> Result<(), StoreError> {
        self.set(TF_WORKING_DIR, "").await?;
        self.set(TF_STAGING_ROOT, "").await
    }

    /// Stable id for this service's remote state, created on first use.
    pub async fn tf_uuid(&self) -> Result<String, StoreError> {
        if let Some(existing) = self.get(TF_UUID).await?.filter(|v| !v.is_empty()) {
            return Ok(existing);
        }
        let fresh = uuid::Uuid::new_v4().to_string();
        self.set(TF_UUID, &fresh).await?;
        Ok(fresh)
    }
}

fn non_empty_path(value: Option<String>) -> Option<PathBuf> {
    value.filter(|v| !v.is_empty()).map(PathBuf::from)
}
