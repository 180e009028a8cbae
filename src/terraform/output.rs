use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::TfsaError;

/// One entry of `terraform output -json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputValue {
    pub value: serde_json::Value,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(rename = "type", default)]
    pub value_type: serde_json::Value,
}

impl OutputValue {
    /// String form for attribute storage: strings unquoted, everything else as JSON.
    pub fn display_value(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

pub type TerraformOutputs = BTreeMap<String, OutputValue>;

pub fn parse_outputs(raw: &str) -> Result<TerraformOutputs, TfsaError> {
    serde_json::from_str(raw).map_err(|e| TfsaError::Parse(e.to_string()))
}
