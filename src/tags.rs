use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, TfsaError};

/// AWS and Azure both cap resources at 50 tags.
pub const MAX_TAGS: usize = 50;

pub const TAGS_FILE: &str = "sandbox_tags.auto.tfvars.json";
pub const DEFAULT_TAGS_VARIABLE: &str = "sandbox_tags";

pub type TagSet = BTreeMap<String, String>;

/// Merges custom tags under the system defaults; defaults win on collision.
pub fn merge_tags(custom: &TagSet, defaults: &TagSet) -> Result<TagSet> {
    let mut merged = custom.clone();
    merged.extend(defaults.iter().map(|(k, v)| (k.clone(), v.clone())));

    if merged.len() > MAX_TAGS {
        return Err(TfsaError::config(format!(
            "AWS and Azure have a limit of {} tags per resource, you have {}",
            MAX_TAGS,
            merged.len()
        )));
    }
    Ok(merged)
}

/// Sandbox metadata that feeds the default tag set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SandboxInfo {
    pub owner: Option<String>,
    pub blueprint: Option<String>,
    pub domain: Option<String>,
}

pub fn default_tags(sandbox_id: &str, info: &SandboxInfo) -> TagSet {
    let mut tags = TagSet::new();
    tags.insert("CreatedBy".to_string(), "tfsa".to_string());
    tags.insert("SandboxId".to_string(), sandbox_id.to_string());

    let optional = [
        ("Owner", &info.owner),
        ("Blueprint", &info.blueprint),
        ("Domain", &info.domain),
    ];
    for (name, value) in optional {
        if let Some(value) = value.as_ref().filter(|v| !v.is_empty()) {
            tags.insert(name.to_string(), value.clone());
        }
    }
    tags
}

/// Applies a merged tag set to the module in a working directory.
pub trait ResourceTagger: Send + Sync {
    fn apply(&self, working_dir: &Path, tags: &TagSet) -> Result<()>;
}

/// Hands tags to the module as an auto-loaded variable value.
///
/// Modules opt in by declaring `variable "sandbox_tags" { type = map(string) }`
/// and passing it to their providers' `default_tags`.
#[derive(Debug, Clone)]
pub struct TfvarsTagger {
    variable: String,
}

impl TfvarsTagger {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }
}

impl Default for TfvarsTagger {
    fn default() -> Self {
        Self::new(DEFAULT_TAGS_VARIABLE)
    }
}

impl ResourceTagger for TfvarsTagger {
    fn apply(&self, working_dir: &Path, tags: &TagSet) -> Result<()> {
        let mut document = serde_json::Map::new();
        document.insert(self.variable.clone(), serde_json::json!(tags));
        let rendered = serde_json::to_string_pretty(&document)
            .map_err(|e| TfsaError::config(format!("cannot render tags: {}", e)))?;
        std::fs::write(working_dir.join(TAGS_FILE), rendered)?;
        tracing::info!(count = tags.len(), file = TAGS_FILE, "tags written");
        Ok(())
    }
}
