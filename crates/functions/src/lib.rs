//! Builtin functions exposed to requesters, grouped by module.
//!
//! Registration is explicit: each module lists its functions and
//! [`register_builtins`] hands them to the registry at startup. Outputs are
//! deterministic fixtures so replies are stable across runs.

use std::sync::Arc;

use mailfn_core::config::RegistryConfig;
use mailfn_core::{
    Arguments, FunctionError, FunctionHandler, FunctionMetadata, FunctionRegistry, RegistryError,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{info, warn};

pub mod analytics;
pub mod finance;
pub mod sales;
pub mod system;
pub mod users;

pub struct BuiltinFunction {
    pub name: &'static str,
    pub handler: Arc<dyn FunctionHandler>,
    pub metadata: FunctionMetadata,
}

impl BuiltinFunction {
    pub(crate) fn new<F>(name: &'static str, handler: F, metadata: FunctionMetadata) -> Self
    where
        F: FunctionHandler + 'static,
    {
        Self { name, handler: Arc::new(handler), metadata }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistrationSummary {
    pub registered: Vec<String>,
    /// Functions whose module is not whitelisted.
    pub skipped: Vec<String>,
}

pub fn builtin_functions() -> Vec<BuiltinFunction> {
    let mut functions = Vec::new();
    functions.extend(sales::functions());
    functions.extend(users::functions());
    functions.extend(finance::functions());
    functions.extend(system::functions());
    functions.extend(analytics::functions());
    functions
}

/// Registers every builtin whose module is whitelisted. Non-whitelisted
/// functions are skipped; any other registration error aborts.
pub fn register_builtins(registry: &FunctionRegistry) -> Result<RegistrationSummary, RegistryError> {
    let mut summary = RegistrationSummary::default();
    for function in builtin_functions() {
        match registry.register(function.name, function.handler, function.metadata) {
            Ok(()) => summary.registered.push(function.name.to_string()),
            Err(RegistryError::ModuleNotAllowed { name, module }) => {
                warn!(
                    event_name = "builtins.function_skipped",
                    function = %name,
                    module = %module,
                    "builtin skipped: module not whitelisted"
                );
                summary.skipped.push(name);
            }
            Err(error) => return Err(error),
        }
    }
    info!(
        event_name = "builtins.registered",
        registered = summary.registered.len(),
        skipped = summary.skipped.len(),
        "builtin functions registered"
    );
    Ok(summary)
}

/// A registry scoped to the configured whitelist with every allowed builtin
/// registered.
pub fn build_registry(
    config: &RegistryConfig,
) -> Result<(FunctionRegistry, RegistrationSummary), RegistryError> {
    let registry = FunctionRegistry::new(config.allowed_modules.iter(), config.argument_mode);
    let summary = register_builtins(&registry)?;
    Ok((registry, summary))
}

pub(crate) fn string_arg<'a>(arguments: &'a Arguments, name: &str) -> Result<&'a str, FunctionError> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| FunctionError::invalid_input(name, "expected text"))
}

pub(crate) fn number_arg(arguments: &Arguments, name: &str) -> Result<f64, FunctionError> {
    arguments
        .get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| FunctionError::invalid_input(name, "expected a number"))
}

pub(crate) fn bool_arg(arguments: &Arguments, name: &str) -> Result<bool, FunctionError> {
    arguments
        .get(name)
        .and_then(Value::as_bool)
        .ok_or_else(|| FunctionError::invalid_input(name, "expected true or false"))
}

/// Whole-number argument within `min..=max`.
pub(crate) fn count_arg(
    arguments: &Arguments,
    name: &str,
    min: u32,
    max: u32,
) -> Result<u32, FunctionError> {
    let value = number_arg(arguments, name)?;
    if value.fract() != 0.0 {
        return Err(FunctionError::invalid_input(name, format!("{value} is not a whole number")));
    }
    if value < f64::from(min) || value > f64::from(max) {
        return Err(FunctionError::invalid_input(
            name,
            format!("{value} is outside {min}..={max}"),
        ));
    }
    Ok(value as u32)
}

/// `$1,234.50` style rendering; negative amounts get a leading minus.
pub fn format_currency(amount: Decimal) -> String {
    let fixed = format!("{:.2}", amount.round_dp(2).abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if amount.is_sign_negative() && !amount.is_zero() { "-" } else { "" };
    format!("{sign}${}.{cents}", group_thousands(whole))
}

pub(crate) fn format_count(count: u64) -> String {
    group_thousands(&count.to_string())
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}
