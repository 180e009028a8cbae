//! Remote state backend wiring.
//!
//! Non-secret settings are written into the working directory as a backend
//! block. Secrets come from the environment and only ever travel as
//! `-backend-config` flags.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, TfsaError};

pub const BACKEND_FILE: &str = "sandbox_backend.tf.json";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BackendProfile {
    /// Terraform backend type, e.g. `s3` or `azurerm`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
    /// Backend setting name -> environment variable holding its value.
    #[serde(default)]
    pub secret_env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct BackendInjector {
    provider: Option<String>,
    profiles: BTreeMap<String, BackendProfile>,
}

impl BackendInjector {
    /// `provider` is the service's "Remote State Provider" attribute; empty means local state.
    pub fn new(provider: Option<String>, profiles: BTreeMap<String, BackendProfile>) -> Self {
        Self {
            provider: provider.filter(|p| !p.trim().is_empty()),
            profiles,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.provider.is_some()
    }

    pub fn build_backend_config(
        &self,
        working_dir: &Path,
        state_key: &str,
    ) -> Result<BTreeMap<String, String>> {
        self.build_with_env(working_dir, state_key, |name| std::env::var(name).ok())
    }

    pub fn build_with_env(
        &self,
        working_dir: &Path,
        state_key: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<BTreeMap<String, String>> {
        let Some(provider) = &self.provider else {
            return Ok(BTreeMap::new());
        };

        let profile = self.profiles.get(provider).ok_or_else(|| {
            TfsaError::config(format!("remote state provider '{}' is not defined", provider))
        })?;

        let secrets = profile
            .secret_env
            .iter()
            .map(|(setting, env_name)| {
                lookup(env_name)
                    .map(|value| (setting.clone(), value))
                    .ok_or_else(|| {
                        TfsaError::config(format!(
                            "backend secret '{}' needs environment variable {}",
                            setting, env_name
                        ))
                    })
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        write_backend_file(working_dir, profile, state_key)?;
        tracing::info!(provider = %provider, backend = %profile.kind, "backend config generated");

        Ok(secrets)
    }
}

fn write_backend_file(working_dir: &Path, profile: &BackendProfile, state_key: &str) -> Result<()> {
    let mut settings = profile.settings.clone();
    settings
        .entry("key".to_string())
        .or_insert_with(|| state_key.to_string());

    let mut backend = serde_json::Map::new();
    backend.insert(profile.kind.clone(), serde_json::json!(settings));
    let document = serde_json::json!({ "terraform": { "backend": backend } });

    let rendered = serde_json::to_string_pretty(&document)
        .map_err(|e| TfsaError::config(format!("cannot render backend config: {}", e)))?;
    std::fs::write(working_dir.join(BACKEND_FILE), rendered)?;
    Ok(())
}
