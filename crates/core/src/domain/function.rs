use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FunctionError;

/// Arguments after validation: every key is a declared parameter and every
/// value already has the declared kind.
pub type Arguments = BTreeMap<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    String,
    Number,
    Boolean,
}

impl ParameterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterSpec {
    pub fn required(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self { name: name.into(), kind, optional: false, default: None }
    }

    pub fn optional(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self { name: name.into(), kind, optional: true, default: None }
    }

    /// An optional parameter that falls back to `default` when absent.
    pub fn with_default(name: impl Into<String>, kind: ParameterKind, default: Value) -> Self {
        Self { name: name.into(), kind, optional: true, default: Some(default) }
    }
}

/// Everything the registry needs to know about a function besides its name
/// and body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionMetadata {
    pub module: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
}

impl FunctionMetadata {
    pub fn new(module: impl Into<String>, description: impl Into<String>) -> Self {
        Self { module: module.into(), description: description.into(), parameters: Vec::new() }
    }

    pub fn param(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }
}

/// Catalog entry handed to the resolver and the dashboard. Never carries the
/// callable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub module: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
}

/// A registered function body. Implementations may block; the execution
/// engine runs them on a dedicated worker under a deadline.
pub trait FunctionHandler: Send + Sync {
    fn call(&self, arguments: &Arguments) -> Result<Value, FunctionError>;
}

impl<F> FunctionHandler for F
where
    F: Fn(&Arguments) -> Result<Value, FunctionError> + Send + Sync,
{
    fn call(&self, arguments: &Arguments) -> Result<Value, FunctionError> {
        self(arguments)
    }
}

#[derive(Clone)]
pub struct RegisteredFunction {
    pub name: String,
    pub metadata: FunctionMetadata,
    pub handler: Arc<dyn FunctionHandler>,
}

impl RegisteredFunction {
    pub fn catalog_entry(&self) -> CatalogEntry {
        CatalogEntry {
            name: self.name.clone(),
            module: self.metadata.module.clone(),
            description: self.metadata.description.clone(),
            parameters: self.metadata.parameters.clone(),
        }
    }
}

impl fmt::Debug for RegisteredFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredFunction")
            .field("name", &self.name)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{FunctionMetadata, ParameterKind, ParameterSpec};

    #[test]
    fn metadata_serializes_without_absent_defaults() {
        let metadata = FunctionMetadata::new("sales", "Total sales for a region")
            .param(ParameterSpec::required("region", ParameterKind::String))
            .param(ParameterSpec::with_default("year", ParameterKind::Number, json!(2024)));

        let value = serde_json::to_value(&metadata).expect("metadata should serialize");
        assert_eq!(value["parameters"][0]["kind"], "string");
        assert!(value["parameters"][0].get("default").is_none());
        assert_eq!(value["parameters"][1]["default"], 2024);
        assert_eq!(value["parameters"][1]["optional"], true);
    }
}
