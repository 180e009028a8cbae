use thiserror::Error;

use crate::sandbox::SandboxError;
use crate::store::StoreError;

pub type Result<T, E = TfsaError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TfsaError {
    /// Terraform exited non-zero, failed to launch, or timed out.
    ///
    /// `detail` is already sanitized and safe to surface to the sandbox.
    #[error("terraform {command} failed: {detail}")]
    Execution { command: String, detail: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to parse terraform output: {0}")]
    Parse(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("another workflow is already running for {scope}")]
    Locked { scope: String },
}

impl TfsaError {
    pub fn config(message: impl Into<String>) -> Self {
        TfsaError::Config(message.into())
    }

    pub fn is_execution(&self) -> bool {
        matches!(self, TfsaError::Execution { .. })
    }

    pub fn is_config(&self) -> bool {
        matches!(self, TfsaError::Config(_))
    }
}
