use mailfn_core::{Arguments, FunctionError, FunctionMetadata, ParameterKind, ParameterSpec};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::{count_arg, format_currency, string_arg, BuiltinFunction};

const MODULE: &str = "sales";

const REGION_TOTALS: [(&str, i64); 4] =
    [("north", 125_000), ("south", 98_400), ("east", 87_250), ("west", 110_600)];

const MONTHLY_SALES: [(&str, i64); 12] = [
    ("january", 71_200),
    ("february", 68_900),
    ("march", 77_450),
    ("april", 74_100),
    ("may", 79_800),
    ("june", 83_350),
    ("july", 80_200),
    ("august", 76_900),
    ("september", 81_750),
    ("october", 85_300),
    ("november", 92_600),
    ("december", 104_150),
];

const CURRENT_MONTH_SALES: i64 = 82_400;
const LAST_MONTH_SALES: i64 = 78_150;

const TOP_PRODUCTS: [(&str, i64); 5] = [
    ("Wireless Headphones", 45_500),
    ("Smart Watch", 38_200),
    ("Laptop Stand", 29_800),
    ("USB-C Hub", 22_100),
    ("Bluetooth Speaker", 19_600),
];

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new(
            "get_sales_total",
            get_sales_total,
            FunctionMetadata::new(MODULE, "Total sales for a region (north, south, east, west or all)")
                .param(ParameterSpec::required("region", ParameterKind::String)),
        ),
        BuiltinFunction::new(
            "calculate_monthly_sales",
            calculate_monthly_sales,
            FunctionMetadata::new(
                MODULE,
                "Sales for one month: a month name, \"current\" or \"last month\"",
            )
            .param(ParameterSpec::with_default("month", ParameterKind::String, json!("current"))),
        ),
        BuiltinFunction::new(
            "get_top_products",
            get_top_products,
            FunctionMetadata::new(MODULE, "Best selling products this month, best first")
                .param(ParameterSpec::with_default("limit", ParameterKind::Number, json!(5))),
        ),
    ]
}

pub fn get_sales_total(arguments: &Arguments) -> Result<Value, FunctionError> {
    let region = string_arg(arguments, "region")?.trim().to_ascii_lowercase();
    if matches!(region.as_str(), "all" | "total" | "everywhere") {
        let total: i64 = REGION_TOTALS.iter().map(|(_, amount)| amount).sum();
        return Ok(json!(total));
    }

    let region = region.strip_suffix(" region").unwrap_or(&region);
    REGION_TOTALS
        .iter()
        .find(|(name, _)| *name == region)
        .map(|(_, amount)| json!(amount))
        .ok_or_else(|| {
            FunctionError::invalid_input(
                "region",
                format!("no sales data for `{region}` (known: north, south, east, west)"),
            )
        })
}

pub fn calculate_monthly_sales(arguments: &Arguments) -> Result<Value, FunctionError> {
    let month = string_arg(arguments, "month")?.trim().to_ascii_lowercase();
    let (label, amount) = match month.as_str() {
        "current" | "this month" | "" => ("current month".to_string(), CURRENT_MONTH_SALES),
        "last" | "last month" | "previous" => ("last month".to_string(), LAST_MONTH_SALES),
        other => {
            let (name, amount) = MONTHLY_SALES
                .iter()
                .find(|(name, _)| *name == other || (other.len() >= 3 && name.starts_with(other)))
                .ok_or_else(|| FunctionError::invalid_input("month", format!("unknown month `{other}`")))?;
            (capitalize(name), *amount)
        }
    };

    Ok(Value::String(format!(
        "Monthly sales for {label}: {}",
        format_currency(Decimal::from(amount))
    )))
}

pub fn get_top_products(arguments: &Arguments) -> Result<Value, FunctionError> {
    let limit = count_arg(arguments, "limit", 1, 50)?.min(TOP_PRODUCTS.len() as u32) as usize;

    let lines: Vec<String> = TOP_PRODUCTS
        .iter()
        .take(limit)
        .enumerate()
        .map(|(index, (product, amount))| {
            format!("{}. {product} - {}", index + 1, format_currency(Decimal::from(*amount)))
        })
        .collect();

    Ok(Value::String(format!("Top {limit} selling products this month:\n{}", lines.join("\n"))))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
