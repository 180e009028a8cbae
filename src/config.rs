//! Service definition loaded from TOML.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, TfsaError};
use crate::sandbox::ReportOptions;
use crate::tags::SandboxInfo;
use crate::terraform::BackendProfile;
use crate::terraform::runner::DEFAULT_TIMEOUT;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub service: ServiceSection,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Service attribute -> terraform variable.
    #[serde(default)]
    pub inputs_map: BTreeMap<String, String>,
    /// Terraform output -> service attribute.
    #[serde(default)]
    pub outputs_map: BTreeMap<String, String>,
    /// Named remote state backends, selected by the "Remote State Provider" attribute.
    #[serde(default)]
    pub backends: BTreeMap<String, BackendProfile>,
    #[serde(default)]
    pub sandbox: SandboxInfo,
    #[serde(default)]
    pub options: Options,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServiceSection {
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Options {
    pub update_live_status: bool,
    pub write_sandbox_messages: bool,
    pub timeout_secs: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            update_live_status: true,
            write_sandbox_messages: true,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl Options {
    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            update_live_status: self.update_live_status,
            write_sandbox_messages: self.write_sandbox_messages,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ServiceConfig {
    pub fn parse(raw: &str) -> Result<Self> {
        let config: ServiceConfig =
            toml::from_str(raw).map_err(|e| TfsaError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.service.name.trim().is_empty() {
            return Err(TfsaError::config("service.name must not be empty"));
        }
        if self.options.timeout_secs == 0 {
            return Err(TfsaError::config("options.timeout_secs must be positive"));
        }
        if let Some((name, _)) = self.backends.iter().find(|(_, p)| p.kind.trim().is_empty()) {
            return Err(TfsaError::config(format!(
                "backend '{}' is missing a type",
                name
            )));
        }
        Ok(())
    }
}

pub fn load(path: &Path) -> Result<ServiceConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        TfsaError::config(format!("cannot read {}: {}", path.display(), e))
    })?;
    let config = ServiceConfig::parse(&raw)?;
    tracing::debug!(
        path = %path.display(),
        service = %config.service.name,
        backends = config.backends.len(),
        "service config loaded"
    );
    Ok(config)
}
