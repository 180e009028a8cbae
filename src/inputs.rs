//! Mapping between service attributes and terraform variables/outputs.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, TfsaError};
use crate::sandbox::SandboxClient;
use crate::store::KeyValueStore;
use crate::tags::TagSet;
use crate::terraform::{TerraformOutputs, Variable};

pub const TERRAFORM_INPUTS: &str = "Terraform Inputs";
pub const TERRAFORM_OUTPUTS: &str = "Terraform Outputs";
pub const TERRAFORM_SENSITIVE_OUTPUTS: &str = "Terraform Sensitive Outputs";
pub const CUSTOM_TAGS: &str = "Custom Tags";
pub const APPLY_TAGS: &str = "Apply Tags";
pub const REMOTE_STATE_PROVIDER: &str = "Remote State Provider";

const VAR_PREFIX: &str = "var_";
const OUT_PREFIX: &str = "out_";

#[async_trait]
pub trait InputOutput: Send + Sync {
    /// Variables sourced from individual service attributes.
    fn mapped_variables(&self) -> Vec<Variable>;

    /// Variables from the free-form "Terraform Inputs" attribute.
    fn input_variables(&self) -> Result<Vec<Variable>>;

    fn custom_tags(&self) -> Result<TagSet>;

    fn apply_tags(&self) -> bool;

    async fn save_outputs(&self, outputs: &TerraformOutputs) -> Result<()>;
}

/// Destination for output write-back.
#[async_trait]
pub trait AttributeSink: Send + Sync {
    async fn set_attribute(&self, name: &str, value: &str) -> Result<()>;
}

/// Writes attributes to the service through the orchestration API.
pub struct ApiAttributeSink {
    client: SandboxClient,
    service: String,
}

impl ApiAttributeSink {
    pub fn new(client: SandboxClient, service: impl Into<String>) -> Self {
        Self {
            client,
            service: service.into(),
        }
    }
}

#[async_trait]
impl AttributeSink for ApiAttributeSink {
    async fn set_attribute(&self, name: &str, value: &str) -> Result<()> {
        Ok(self.client.set_attribute(&self.service, name, value).await?)
    }
}

/// Keeps attributes in the key-value store, for runs without an API.
pub struct StoreAttributeSink {
    store: Arc<dyn KeyValueStore>,
    scope: String,
}

impl StoreAttributeSink {
    pub fn new(store: Arc<dyn KeyValueStore>, scope: impl Into<String>) -> Self {
        Self {
            store,
            scope: scope.into(),
        }
    }

    pub fn key(scope: &str, name: &str) -> String {
        format!("{}.attributes.{}", scope, name)
    }
}

#[async_trait]
impl AttributeSink for StoreAttributeSink {
    async fn set_attribute(&self, name: &str, value: &str) -> Result<()> {
        Ok(self.store.set(&Self::key(&self.scope, name), value).await?)
    }
}

pub struct AttributeMapper {
    attributes: BTreeMap<String, String>,
    inputs_map: BTreeMap<String, String>,
    outputs_map: BTreeMap<String, String>,
    sink: Arc<dyn AttributeSink>,
}

impl AttributeMapper {
    pub fn new(
        attributes: BTreeMap<String, String>,
        inputs_map: BTreeMap<String, String>,
        outputs_map: BTreeMap<String, String>,
        sink: Arc<dyn AttributeSink>,
    ) -> Self {
        Self {
            attributes,
            inputs_map,
            outputs_map,
            sink,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    fn output_target(&self, output: &str) -> Option<String> {
        if let Some(mapped) = self.outputs_map.get(output) {
            return Some(mapped.clone());
        }
        let conventional = format!("{}{}", OUT_PREFIX, output);
        self.attributes
            .contains_key(&conventional)
            .then_some(conventional)
    }
}

#[async_trait]
impl InputOutput for AttributeMapper {
    fn mapped_variables(&self) -> Vec<Variable> {
        let explicit = self.inputs_map.iter().filter_map(|(attr, var)| {
            self.attributes
                .get(attr)
                .map(|value| Variable::new(var.clone(), value.clone()))
        });

        let conventional = self.attributes.iter().filter_map(|(attr, value)| {
            attr.strip_prefix(VAR_PREFIX)
                .filter(|name| !name.is_empty())
                .map(|name| Variable::new(name, value.clone()))
        });

        explicit.chain(conventional).collect()
    }

    fn input_variables(&self) -> Result<Vec<Variable>> {
        let Some(raw) = self.attribute(TERRAFORM_INPUTS) else {
            return Ok(Vec::new());
        };
        Ok(parse_pairs(TERRAFORM_INPUTS, raw)?
            .into_iter()
            .map(|(name, value)| Variable::new(name, value))
            .collect())
    }

    fn custom_tags(&self) -> Result<TagSet> {
        match self.attribute(CUSTOM_TAGS) {
            Some(raw) => Ok(parse_pairs(CUSTOM_TAGS, raw)?.into_iter().collect()),
            None => Ok(TagSet::new()),
        }
    }

    fn apply_tags(&self) -> bool {
        self.attribute(APPLY_TAGS)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"))
            .unwrap_or(false)
    }

    async fn save_outputs(&self, outputs: &TerraformOutputs) -> Result<()> {
        let mut plain = Vec::new();
        let mut sensitive = Vec::new();

        for (name, output) in outputs {
            let value = output.display_value();
            match self.output_target(name) {
                Some(attr) => self.sink.set_attribute(&attr, &value).await?,
                None if output.sensitive => sensitive.push(format!("{}={}", name, value)),
                None => plain.push(format!("{}={}", name, value)),
            }
        }

        self.sink
            .set_attribute(TERRAFORM_OUTPUTS, &plain.join(","))
            .await?;
        self.sink
            .set_attribute(TERRAFORM_SENSITIVE_OUTPUTS, &sensitive.join(","))
            .await?;

        tracing::info!(
            count = outputs.len(),
            unmapped = plain.len(),
            sensitive = sensitive.len(),
            "terraform outputs saved"
        );
        Ok(())
    }
}

/// Parses `key=value,key2=value2`. Values may contain `=` but not `,`.
pub fn parse_pairs(attribute: &str, raw: &str) -> Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                TfsaError::config(format!(
                    "'{}' entry '{}' is not in key=value form",
                    attribute, segment
                ))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(TfsaError::config(format!(
                    "'{}' entry '{}' has an empty key",
                    attribute, segment
                )));
            }
            Ok((key.to_string(), value.trim().to_string()))
        })
        .collect()
}
