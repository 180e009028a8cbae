//! tfsa - Terraform Sandbox Automation
//!
//! Drives a Terraform module through execute and destroy workflows on behalf of a
//! sandbox service, persisting run status so repeated runs are gated safely.

pub mod config;
pub mod inputs;
pub mod lock;
pub mod sandbox;
pub mod status;
pub mod store;
pub mod tags;
pub mod terraform;
pub mod workdir;
pub mod workflow;

mod error;

pub use error::{Result, TfsaError};
pub use sandbox::{SandboxClient, SandboxError};
pub use status::{DestroyStatus, ExecutionStatus, RunStatus, SandboxData};
pub use store::{FileStore, KeyValueStore, StoreError};
pub use workflow::{SandboxWorkflow, StatusReport, WorkflowContext};
