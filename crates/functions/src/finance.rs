use mailfn_core::{Arguments, FunctionError, FunctionMetadata, ParameterKind, ParameterSpec};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::{bool_arg, format_currency, number_arg, string_arg, BuiltinFunction};

const MODULE: &str = "finance";

const QUARTER_REVENUE: [i64; 4] = [96_000, 104_500, 112_800, 121_300];
/// Quarter reported when the request says "current".
const CURRENT_QUARTER: usize = 3;

const CASH_INFLOW: i64 = 118_400;
const CASH_OUTFLOW: i64 = 91_750;
const OPENING_CASH: i64 = 142_300;
/// Operating, investing, financing. Sums to the month's net flow.
const CASH_FLOW_CATEGORIES: [(&str, i64); 3] =
    [("Operating", 37_550), ("Investing", -18_400), ("Financing", 7_500)];

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new(
            "calculate_profit_loss",
            calculate_profit_loss,
            FunctionMetadata::new(MODULE, "Profit and loss statement for a quarter (Q1-Q4 or current)")
                .param(ParameterSpec::with_default("quarter", ParameterKind::String, json!("current"))),
        ),
        BuiltinFunction::new(
            "calculate_roi",
            calculate_roi,
            FunctionMetadata::new(MODULE, "Return on investment from an investment and its return")
                .param(ParameterSpec::required("investment", ParameterKind::Number))
                .param(ParameterSpec::required("return_amount", ParameterKind::Number)),
        ),
        BuiltinFunction::new(
            "get_cash_flow",
            get_cash_flow,
            FunctionMetadata::new(MODULE, "This month's cash flow and projected cash position")
                .param(ParameterSpec::with_default("include_breakdown", ParameterKind::Boolean, json!(true))),
        ),
    ]
}

fn cost_rates() -> (Decimal, Decimal, Decimal) {
    // cost of goods, operating expenses, marketing
    (Decimal::new(38, 2), Decimal::new(275, 3), Decimal::new(12, 2))
}

pub fn calculate_profit_loss(arguments: &Arguments) -> Result<Value, FunctionError> {
    let quarter = parse_quarter(string_arg(arguments, "quarter")?)?;
    let revenue = Decimal::from(QUARTER_REVENUE[quarter - 1]);
    let (cogs_rate, opex_rate, marketing_rate) = cost_rates();

    let cost_of_goods = (revenue * cogs_rate).round_dp(2);
    let operating = (revenue * opex_rate).round_dp(2);
    let marketing = (revenue * marketing_rate).round_dp(2);
    let gross_profit = revenue - cost_of_goods;
    let net_profit = gross_profit - operating - marketing;
    let margin = (net_profit / revenue * Decimal::ONE_HUNDRED).round_dp(1);

    Ok(Value::String(format!(
        "Profit & Loss (Q{quarter}):\n\
         Revenue: {}\n\
         Cost of goods sold: {}\n\
         Gross profit: {}\n\
         Operating expenses: {}\n\
         Marketing: {}\n\
         Net profit: {}\n\
         Profit margin: {margin:.1}%",
        format_currency(revenue),
        format_currency(cost_of_goods),
        format_currency(gross_profit),
        format_currency(operating),
        format_currency(marketing),
        format_currency(net_profit),
    )))
}

pub fn calculate_roi(arguments: &Arguments) -> Result<Value, FunctionError> {
    let investment = decimal_arg(arguments, "investment")?;
    let returned = decimal_arg(arguments, "return_amount")?;
    if investment <= Decimal::ZERO {
        return Err(FunctionError::invalid_input("investment", "must be greater than zero"));
    }

    let roi = ((returned - investment) / investment * Decimal::ONE_HUNDRED).round_dp(2);
    Ok(Value::String(format!(
        "ROI: {roi:.2}% (investment {}, return {})",
        format_currency(investment),
        format_currency(returned)
    )))
}

pub fn get_cash_flow(arguments: &Arguments) -> Result<Value, FunctionError> {
    let include_breakdown = bool_arg(arguments, "include_breakdown")?;
    let net = CASH_INFLOW - CASH_OUTFLOW;

    let mut lines = vec![
        "Cash flow (current month):".to_string(),
        format!("Cash inflow: {}", format_currency(Decimal::from(CASH_INFLOW))),
        format!("Cash outflow: {}", format_currency(Decimal::from(CASH_OUTFLOW))),
        format!("Net cash flow: {}", format_currency(Decimal::from(net))),
        format!("Current cash: {}", format_currency(Decimal::from(OPENING_CASH))),
        format!("Projected cash: {}", format_currency(Decimal::from(OPENING_CASH + net))),
    ];
    if include_breakdown {
        lines.push("By category:".to_string());
        lines.extend(
            CASH_FLOW_CATEGORIES
                .iter()
                .map(|(category, amount)| format!("- {category}: {}", format_currency(Decimal::from(*amount)))),
        );
    }
    Ok(Value::String(lines.join("\n")))
}

fn decimal_arg(arguments: &Arguments, name: &str) -> Result<Decimal, FunctionError> {
    let value = number_arg(arguments, name)?;
    Decimal::try_from(value).map_err(|error| FunctionError::invalid_input(name, error))
}

fn parse_quarter(raw: &str) -> Result<usize, FunctionError> {
    let normalized = raw.trim().to_ascii_lowercase();
    if matches!(normalized.as_str(), "current" | "this quarter" | "") {
        return Ok(CURRENT_QUARTER);
    }
    let digits = normalized.trim_start_matches('q').trim_start_matches("uarter").trim();
    match digits.parse::<usize>() {
        Ok(quarter @ 1..=4) => Ok(quarter),
        _ => Err(FunctionError::invalid_input("quarter", format!("`{raw}` is not Q1-Q4"))),
    }
}
