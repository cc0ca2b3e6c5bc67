use mailfn_core::{Arguments, FunctionError, FunctionMetadata, ParameterKind, ParameterSpec};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::{format_count, format_currency, number_arg, string_arg, BuiltinFunction};

const MODULE: &str = "analytics";

/// Visitors, leads, trials, customers.
const MONTH_FUNNEL: [u64; 4] = [12_400, 1_488, 446, 112];
const WEEK_FUNNEL: [u64; 4] = [3_100, 372, 112, 28];

const CURRENCIES: [&str; 4] = ["USD", "EUR", "GBP", "JPY"];

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new(
            "get_conversion_metrics",
            get_conversion_metrics,
            FunctionMetadata::new(MODULE, "Conversion funnel from visitors to paying customers (week or month)")
                .param(ParameterSpec::with_default("period", ParameterKind::String, json!("month"))),
        ),
        BuiltinFunction::new(
            "calculate_sales_growth",
            calculate_sales_growth,
            FunctionMetadata::new(MODULE, "Growth rate and trend between two sales figures")
                .param(ParameterSpec::required("current_sales", ParameterKind::Number))
                .param(ParameterSpec::required("previous_sales", ParameterKind::Number)),
        ),
        BuiltinFunction::new(
            "convert_currency",
            convert_currency,
            FunctionMetadata::new(MODULE, "Convert an amount between USD, EUR, GBP and JPY")
                .param(ParameterSpec::required("amount", ParameterKind::Number))
                .param(ParameterSpec::with_default("from_currency", ParameterKind::String, json!("USD")))
                .param(ParameterSpec::with_default("to_currency", ParameterKind::String, json!("EUR"))),
        ),
    ]
}

pub fn get_conversion_metrics(arguments: &Arguments) -> Result<Value, FunctionError> {
    let period = string_arg(arguments, "period")?;
    let (label, funnel) = match period.trim().to_ascii_lowercase().as_str() {
        "month" | "this month" | "monthly" | "" => ("this month", MONTH_FUNNEL),
        "week" | "this week" | "weekly" => ("this week", WEEK_FUNNEL),
        _ => {
            return Err(FunctionError::invalid_input(
                "period",
                format!("`{period}` is not week or month"),
            ))
        }
    };
    let [visitors, leads, trials, customers] = funnel;

    Ok(Value::String(format!(
        "Conversion funnel ({label}):\n\
         1. Visitors: {}\n\
         2. Leads: {} ({:.1}% conversion)\n\
         3. Trial users: {} ({:.1}% conversion)\n\
         4. Paying customers: {} ({:.1}% conversion)\n\
         Overall conversion rate: {:.2}%",
        format_count(visitors),
        format_count(leads),
        percent(leads, visitors),
        format_count(trials),
        percent(trials, leads),
        format_count(customers),
        percent(customers, trials),
        percent(customers, visitors),
    )))
}

fn percent(part: u64, whole: u64) -> f64 {
    part as f64 / whole as f64 * 100.0
}

pub fn calculate_sales_growth(arguments: &Arguments) -> Result<Value, FunctionError> {
    let current = decimal_arg(arguments, "current_sales")?;
    let previous = decimal_arg(arguments, "previous_sales")?;
    if previous <= Decimal::ZERO {
        return Err(FunctionError::invalid_input("previous_sales", "must be greater than zero"));
    }

    let growth = ((current - previous) / previous * Decimal::ONE_HUNDRED).round_dp(1);
    let trend = if growth > Decimal::ZERO {
        "growing"
    } else if growth < Decimal::new(-5, 0) {
        "declining"
    } else {
        "stable"
    };

    Ok(Value::String(format!(
        "Sales growth:\n\
         Current period: {}\n\
         Previous period: {}\n\
         Growth rate: {growth:.1}%\n\
         Trend: {trend}",
        format_currency(current),
        format_currency(previous),
    )))
}

pub fn convert_currency(arguments: &Arguments) -> Result<Value, FunctionError> {
    let amount = decimal_arg(arguments, "amount")?;
    if amount < Decimal::ZERO {
        return Err(FunctionError::invalid_input("amount", "must not be negative"));
    }
    let from = currency_arg(arguments, "from_currency")?;
    let to = currency_arg(arguments, "to_currency")?;

    if from == to {
        return Ok(Value::String(format!("{amount:.2} {from} = {amount:.2} {to}")));
    }
    let rate = exchange_rate(&from, &to).ok_or_else(|| {
        FunctionError::invalid_input("to_currency", format!("no rate from {from} to {to}"))
    })?;
    let converted = (amount * rate).round_dp(2);

    Ok(Value::String(format!("{amount:.2} {from} = {converted:.2} {to} (rate {rate})")))
}

fn currency_arg(arguments: &Arguments, name: &str) -> Result<String, FunctionError> {
    let code = string_arg(arguments, name)?.trim().to_ascii_uppercase();
    if CURRENCIES.contains(&code.as_str()) {
        Ok(code)
    } else {
        Err(FunctionError::invalid_input(name, format!("unsupported currency `{code}`")))
    }
}

fn exchange_rate(from: &str, to: &str) -> Option<Decimal> {
    let rate = match (from, to) {
        ("USD", "EUR") => Decimal::new(85, 2),
        ("USD", "GBP") => Decimal::new(75, 2),
        ("USD", "JPY") => Decimal::from(110),
        ("EUR", "USD") => Decimal::new(118, 2),
        ("EUR", "GBP") => Decimal::new(88, 2),
        ("EUR", "JPY") => Decimal::from(130),
        ("GBP", "USD") => Decimal::new(133, 2),
        ("GBP", "EUR") => Decimal::new(114, 2),
        ("GBP", "JPY") => Decimal::from(147),
        _ => return None,
    };
    Some(rate)
}

fn decimal_arg(arguments: &Arguments, name: &str) -> Result<Decimal, FunctionError> {
    let value = number_arg(arguments, name)?;
    Decimal::try_from(value).map_err(|error| FunctionError::invalid_input(name, error))
}
