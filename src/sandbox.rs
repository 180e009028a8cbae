mod client;
mod error;
mod types;

pub use client::SandboxClient;
pub use error::SandboxError;
pub use types::{DataEntry, LiveStatus};

use async_trait::async_trait;

/// Side channel for progress notifications shown in the sandbox.
///
/// Failures here never abort a workflow; callers log and continue.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn set_live_status(
        &self,
        status: LiveStatus,
        description: &str,
    ) -> Result<(), SandboxError>;

    async fn write_message(&self, message: &str) -> Result<(), SandboxError>;
}

/// Toggles for the two reporting channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    pub update_live_status: bool,
    pub write_sandbox_messages: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            update_live_status: true,
            write_sandbox_messages: true,
        }
    }
}

/// Reports to the orchestration API on behalf of one service.
pub struct ApiReporter {
    client: SandboxClient,
    service: String,
    options: ReportOptions,
}

impl ApiReporter {
    pub fn new(client: SandboxClient, service: impl Into<String>, options: ReportOptions) -> Self {
        Self {
            client,
            service: service.into(),
            options,
        }
    }
}

#[async_trait]
impl Reporter for ApiReporter {
    async fn set_live_status(
        &self,
        status: LiveStatus,
        description: &str,
    ) -> Result<(), SandboxError> {
        if !self.options.update_live_status {
            return Ok(());
        }
        self.client
            .set_live_status(&self.service, status, description)
            .await
    }

    async fn write_message(&self, message: &str) -> Result<(), SandboxError> {
        if !self.options.write_sandbox_messages {
            return Ok(());
        }
        let line = format!("{}: {}", self.service, message);
        self.client.write_message(&line).await
    }
}

/// Reporter used when no orchestration API is configured.
pub struct TracingReporter {
    service: String,
}

impl TracingReporter {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

#[async_trait]
impl Reporter for TracingReporter {
    async fn set_live_status(
        &self,
        status: LiveStatus,
        description: &str,
    ) -> Result<(), SandboxError> {
        tracing::info!(service = %self.service, status = %status, description, "live status");
        Ok(())
    }

    async fn write_message(&self, message: &str) -> Result<(), SandboxError> {
        tracing::info!(service = %self.service, message, "sandbox message");
        Ok(())
    }
}
