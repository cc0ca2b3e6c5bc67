//! Function registry
//!
//! Holds the functions requests may invoke, keyed by unique name, and the
//! module whitelist they were admitted under. Registration is serialized by a
//! write lock; lookups and catalog reads share a read lock and hand out
//! `Arc`s so no lock is held while a function runs.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::{debug, info, warn};

use crate::domain::function::{
    Arguments, CatalogEntry, FunctionHandler, FunctionMetadata, ParameterKind, ParameterSpec,
    RegisteredFunction,
};
use crate::errors::{ArgumentError, RegistryError};

/// How to treat argument keys the function does not declare.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentMode {
    #[default]
    Strict,
    Lenient,
}

impl ArgumentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Lenient => "lenient",
        }
    }
}

impl std::str::FromStr for ArgumentMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            other => Err(format!("unsupported argument mode `{other}` (expected strict|lenient)")),
        }
    }
}

#[derive(Default)]
struct Entries {
    by_name: HashMap<String, usize>,
    ordered: Vec<Arc<RegisteredFunction>>,
}

pub struct FunctionRegistry {
    allowed_modules: BTreeSet<String>,
    mode: ArgumentMode,
    entries: RwLock<Entries>,
}

impl FunctionRegistry {
    pub fn new<I, S>(allowed_modules: I, mode: ArgumentMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_modules: allowed_modules
                .into_iter()
                .map(Into::into)
                .map(|module: String| module.trim().to_string())
                .filter(|module| !module.is_empty())
                .collect(),
            mode,
            entries: RwLock::new(Entries::default()),
        }
    }

    pub fn allowed_modules(&self) -> impl Iterator<Item = &str> {
        self.allowed_modules.iter().map(String::as_str)
    }

    pub fn mode(&self) -> ArgumentMode {
        self.mode
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn FunctionHandler>,
        metadata: FunctionMetadata,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        validate_definition(&name, &metadata)?;

        if !self.allowed_modules.contains(&metadata.module) {
            warn!(
                event_name = "registry.module_not_allowed",
                function = %name,
                module = %metadata.module,
                "function rejected: module is not whitelisted"
            );
            return Err(RegistryError::ModuleNotAllowed { name, module: metadata.module });
        }

        let mut entries = self.write();
        if entries.by_name.contains_key(&name) {
            warn!(
                event_name = "registry.duplicate_name",
                function = %name,
                "function rejected: name already registered"
            );
            return Err(RegistryError::DuplicateName(name));
        }

        info!(
            event_name = "registry.function_registered",
            function = %name,
            module = %metadata.module,
            parameter_count = metadata.parameters.len(),
            "function registered"
        );
        let index = entries.ordered.len();
        entries.by_name.insert(name.clone(), index);
        entries.ordered.push(Arc::new(RegisteredFunction { name, metadata, handler }));
        Ok(())
    }

    /// Convenience wrapper for plain functions and closures.
    pub fn register_fn<F>(
        &self,
        name: impl Into<String>,
        handler: F,
        metadata: FunctionMetadata,
    ) -> Result<(), RegistryError>
    where
        F: FunctionHandler + 'static,
    {
        self.register(name, Arc::new(handler), metadata)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<RegisteredFunction>> {
        let entries = self.read();
        entries.by_name.get(name).map(|index| Arc::clone(&entries.ordered[*index]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().by_name.contains_key(name)
    }

    /// Catalog in registration order.
    pub fn list_metadata(&self) -> Vec<CatalogEntry> {
        self.read().ordered.iter().map(|function| function.catalog_entry()).collect()
    }

    /// Case-insensitive substring search over names and descriptions.
    pub fn search(&self, query: &str) -> Vec<CatalogEntry> {
        let needle = query.trim().to_lowercase();
        self.read()
            .ordered
            .iter()
            .filter(|function| {
                needle.is_empty()
                    || function.name.to_lowercase().contains(&needle)
                    || function.metadata.description.to_lowercase().contains(&needle)
            })
            .map(|function| function.catalog_entry())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate_arguments(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Arguments, ArgumentError> {
        let function =
            self.lookup(name).ok_or_else(|| ArgumentError::UnknownFunction(name.to_string()))?;
        normalize_arguments(&function.metadata.parameters, arguments, self.mode)
    }

    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        match self.entries.read() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        match self.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn validate_definition(name: &str, metadata: &FunctionMetadata) -> Result<(), RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidDefinition { name: name.to_string(), reason };

    if name.trim().is_empty() || name.chars().any(char::is_whitespace) {
        return Err(invalid("name must be non-empty and contain no whitespace".to_string()));
    }

    let mut seen = BTreeSet::new();
    for parameter in &metadata.parameters {
        if !seen.insert(parameter.name.as_str()) {
            return Err(invalid(format!("parameter `{}` is declared twice", parameter.name)));
        }
        if let Some(default) = &parameter.default {
            if coerce(parameter, default).is_err() {
                return Err(invalid(format!(
                    "default for `{}` is not a {}",
                    parameter.name, parameter.kind
                )));
            }
        }
    }

    Ok(())
}

pub(crate) fn normalize_arguments(
    parameters: &[ParameterSpec],
    raw: &Map<String, Value>,
    mode: ArgumentMode,
) -> Result<Arguments, ArgumentError> {
    for key in raw.keys() {
        if parameters.iter().all(|parameter| &parameter.name != key) {
            match mode {
                ArgumentMode::Strict => {
                    return Err(ArgumentError::UnknownParameter { parameter: key.clone() })
                }
                ArgumentMode::Lenient => {
                    debug!(
                        event_name = "registry.unknown_argument_dropped",
                        parameter = %key,
                        "dropping undeclared argument"
                    );
                }
            }
        }
    }

    let mut normalized = Arguments::new();
    for parameter in parameters {
        match raw.get(&parameter.name).filter(|value| !value.is_null()) {
            Some(value) => {
                normalized.insert(parameter.name.clone(), coerce(parameter, value)?);
            }
            None => {
                if let Some(default) = &parameter.default {
                    normalized.insert(parameter.name.clone(), coerce(parameter, default)?);
                } else if !parameter.optional {
                    return Err(ArgumentError::MissingParameter {
                        parameter: parameter.name.clone(),
                    });
                }
            }
        }
    }

    Ok(normalized)
}

fn coerce(parameter: &ParameterSpec, value: &Value) -> Result<Value, ArgumentError> {
    let mismatch = || ArgumentError::TypeMismatch {
        parameter: parameter.name.clone(),
        expected: parameter.kind,
        found: describe(value),
    };

    match parameter.kind {
        ParameterKind::String => match value {
            Value::String(text) => Ok(Value::String(text.clone())),
            Value::Number(number) => Ok(Value::String(number.to_string())),
            Value::Bool(flag) => Ok(Value::String(flag.to_string())),
            _ => Err(mismatch()),
        },
        ParameterKind::Number => match value {
            Value::Number(number) => Ok(Value::Number(number.clone())),
            Value::String(text) => parse_number(text).ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
        ParameterKind::Boolean => match value {
            Value::Bool(flag) => Ok(Value::Bool(*flag)),
            Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "0" => Ok(Value::Bool(false)),
                _ => Err(mismatch()),
            },
            Value::Number(number) => match number.as_f64() {
                Some(n) if n == 0.0 => Ok(Value::Bool(false)),
                Some(n) if n == 1.0 => Ok(Value::Bool(true)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
    }
}

fn parse_number(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Some(Value::Number(integer.into()));
    }
    trimmed.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(flag) => format!("boolean {flag}"),
        Value::Number(number) => format!("number {number}"),
        Value::String(text) => format!("string {:?}", text.chars().take(40).collect::<String>()),
        Value::Array(_) => "a list".to_string(),
        Value::Object(_) => "an object".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::{json, Map, Value};

    use super::{ArgumentMode, FunctionRegistry};
    use crate::domain::function::{Arguments, FunctionMetadata, ParameterKind, ParameterSpec};
    use crate::errors::{ArgumentError, FunctionError, RegistryError};

    fn sales_total(arguments: &Arguments) -> Result<Value, FunctionError> {
        match arguments.get("region").and_then(Value::as_str) {
            Some("north") => Ok(json!(125000)),
            _ => Ok(json!(0)),
        }
    }

    fn sales_metadata() -> FunctionMetadata {
        FunctionMetadata::new("sales", "Total sales for a region")
            .param(ParameterSpec::required("region", ParameterKind::String))
    }

    fn registry(mode: ArgumentMode) -> FunctionRegistry {
        FunctionRegistry::new(["sales", "users"], mode)
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn duplicate_name_is_rejected_and_first_entry_retained() {
        let registry = registry(ArgumentMode::Strict);
        registry.register_fn("getSalesTotal", sales_total, sales_metadata()).expect("first");

        let second = registry.register_fn(
            "getSalesTotal",
            sales_total,
            FunctionMetadata::new("users", "impostor"),
        );

        assert_eq!(second, Err(RegistryError::DuplicateName("getSalesTotal".to_string())));
        let kept = registry.lookup("getSalesTotal").expect("first entry kept");
        assert_eq!(kept.metadata.module, "sales");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn non_whitelisted_module_never_reaches_catalog() {
        let registry = registry(ArgumentMode::Strict);
        let result = registry.register_fn(
            "wipe_disk",
            sales_total,
            FunctionMetadata::new("admin", "Dangerous"),
        );

        assert!(matches!(result, Err(RegistryError::ModuleNotAllowed { ref module, .. }) if module == "admin"));
        assert!(registry.list_metadata().is_empty());
        assert!(registry.lookup("wipe_disk").is_none());
    }

    #[test]
    fn invalid_default_is_rejected_at_registration() {
        let registry = registry(ArgumentMode::Strict);
        let result = registry.register_fn(
            "getSalesTotal",
            sales_total,
            FunctionMetadata::new("sales", "Total")
                .param(ParameterSpec::with_default("year", ParameterKind::Number, json!("soon"))),
        );
        assert!(matches!(result, Err(RegistryError::InvalidDefinition { .. })));
    }

    #[test]
    fn catalog_preserves_registration_order() {
        let registry = registry(ArgumentMode::Strict);
        for name in ["b_second", "a_first", "c_third"] {
            registry
                .register_fn(name, sales_total, FunctionMetadata::new("sales", name))
                .expect("register");
        }

        let names: Vec<String> =
            registry.list_metadata().into_iter().map(|entry| entry.name).collect();
        assert_eq!(names, vec!["b_second", "a_first", "c_third"]);
    }

    #[test]
    fn search_matches_name_and_description_case_insensitively() {
        let registry = registry(ArgumentMode::Strict);
        registry.register_fn("getSalesTotal", sales_total, sales_metadata()).expect("register");
        registry
            .register_fn(
                "get_total_users",
                sales_total,
                FunctionMetadata::new("users", "Count registered users"),
            )
            .expect("register");

        assert_eq!(registry.search("SALES").len(), 1);
        assert_eq!(registry.search("registered")[0].name, "get_total_users");
        assert_eq!(registry.search("").len(), 2);
    }

    #[test]
    fn missing_required_argument_is_rejected() {
        let registry = registry(ArgumentMode::Strict);
        registry.register_fn("getSalesTotal", sales_total, sales_metadata()).expect("register");

        let result = registry.validate_arguments("getSalesTotal", &Map::new());
        assert_eq!(
            result,
            Err(ArgumentError::MissingParameter { parameter: "region".to_string() })
        );
    }

    #[test]
    fn null_counts_as_missing() {
        let registry = registry(ArgumentMode::Strict);
        registry.register_fn("getSalesTotal", sales_total, sales_metadata()).expect("register");

        let result = registry.validate_arguments("getSalesTotal", &args(json!({"region": null})));
        assert!(matches!(result, Err(ArgumentError::MissingParameter { .. })));
    }

    #[test]
    fn strict_mode_rejects_unknown_parameters() {
        let registry = registry(ArgumentMode::Strict);
        registry.register_fn("getSalesTotal", sales_total, sales_metadata()).expect("register");

        let result = registry
            .validate_arguments("getSalesTotal", &args(json!({"region": "north", "limit": 3})));
        assert_eq!(result, Err(ArgumentError::UnknownParameter { parameter: "limit".to_string() }));
    }

    #[test]
    fn lenient_mode_drops_unknown_parameters() {
        let registry = registry(ArgumentMode::Lenient);
        registry.register_fn("getSalesTotal", sales_total, sales_metadata()).expect("register");

        let normalized = registry
            .validate_arguments("getSalesTotal", &args(json!({"region": "north", "limit": 3})))
            .expect("lenient validation");
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized["region"], json!("north"));
    }

    #[test]
    fn values_are_coerced_to_declared_kinds() {
        let registry = registry(ArgumentMode::Strict);
        registry
            .register_fn(
                "get_user_activity",
                sales_total,
                FunctionMetadata::new("users", "Active users")
                    .param(ParameterSpec::required("days", ParameterKind::Number))
                    .param(ParameterSpec::required("include_trial", ParameterKind::Boolean))
                    .param(ParameterSpec::required("segment", ParameterKind::String)),
            )
            .expect("register");

        let normalized = registry
            .validate_arguments(
                "get_user_activity",
                &args(json!({"days": " 30 ", "include_trial": "yes", "segment": 7})),
            )
            .expect("coercible arguments");

        assert_eq!(normalized["days"], json!(30));
        assert_eq!(normalized["include_trial"], json!(true));
        assert_eq!(normalized["segment"], json!("7"));

        let bad = registry.validate_arguments(
            "get_user_activity",
            &args(json!({"days": "a month", "include_trial": true, "segment": "all"})),
        );
        assert!(matches!(
            bad,
            Err(ArgumentError::TypeMismatch { ref parameter, expected: ParameterKind::Number, .. })
                if parameter == "days"
        ));
    }

    #[test]
    fn defaults_fill_absent_optional_parameters() {
        let registry = registry(ArgumentMode::Strict);
        registry
            .register_fn(
                "calculate_monthly_sales",
                sales_total,
                FunctionMetadata::new("sales", "Monthly sales")
                    .param(ParameterSpec::with_default(
                        "month",
                        ParameterKind::String,
                        json!("current"),
                    ))
                    .param(ParameterSpec::optional("region", ParameterKind::String)),
            )
            .expect("register");

        let normalized =
            registry.validate_arguments("calculate_monthly_sales", &Map::new()).expect("defaults");
        assert_eq!(normalized["month"], json!("current"));
        assert!(!normalized.contains_key("region"));
    }

    #[test]
    fn validating_unknown_function_fails() {
        let registry = registry(ArgumentMode::Strict);
        let result = registry.validate_arguments("nope", &Map::new());
        assert_eq!(result, Err(ArgumentError::UnknownFunction("nope".to_string())));
    }

    #[test]
    fn concurrent_lookups_during_registration_are_consistent() {
        let registry = Arc::new(registry(ArgumentMode::Strict));
        let hits = Arc::new(AtomicUsize::new(0));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let hits = Arc::clone(&hits);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        if registry.lookup("fn_0").is_some() {
                            hits.fetch_add(1, Ordering::Relaxed);
                        }
                        let _ = registry.list_metadata();
                    }
                })
            })
            .collect();

        for index in 0..50 {
            registry
                .register_fn(
                    format!("fn_{index}"),
                    sales_total,
                    FunctionMetadata::new("sales", "generated"),
                )
                .expect("register");
        }

        for reader in readers {
            reader.join().expect("reader thread");
        }
        assert_eq!(registry.len(), 50);
        assert!(registry.lookup("fn_49").is_some());
    }
}
