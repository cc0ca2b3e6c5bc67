use mailfn_core::{Arguments, FunctionError, FunctionMetadata, ParameterKind, ParameterSpec};
use serde_json::{json, Value};

use crate::{bool_arg, count_arg, format_count, BuiltinFunction};

const MODULE: &str = "users";

const TOTAL_USERS: u64 = 3_120;
const ACTIVE_USERS: u64 = 2_340;
const NEW_USERS_THIS_MONTH: u64 = 96;

const DAILY_ACTIVE: u64 = 1_040;
const AVERAGE_SESSION_MINUTES: u64 = 27;

/// Percent shares; each table sums to 100.
const REGION_SHARES: [(&str, u64); 4] =
    [("North America", 45), ("Europe", 30), ("Asia", 18), ("Other", 7)];
const AGE_SHARES: [(&str, u64); 4] = [("18-25", 24), ("26-35", 39), ("36-50", 26), ("50+", 11)];

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new(
            "get_total_users",
            get_total_users,
            FunctionMetadata::new(MODULE, "Registered, active and new user counts"),
        ),
        BuiltinFunction::new(
            "get_user_activity",
            get_user_activity,
            FunctionMetadata::new(MODULE, "Active users and engagement over the last N days")
                .param(ParameterSpec::with_default("days", ParameterKind::Number, json!(7))),
        ),
        BuiltinFunction::new(
            "get_user_demographics",
            get_user_demographics,
            FunctionMetadata::new(MODULE, "Regional and age distribution of users")
                .param(ParameterSpec::with_default("include_inactive", ParameterKind::Boolean, json!(false))),
        ),
    ]
}

pub fn get_total_users(_: &Arguments) -> Result<Value, FunctionError> {
    Ok(json!({
        "total_users": TOTAL_USERS,
        "active_users": ACTIVE_USERS,
        "new_users_this_month": NEW_USERS_THIS_MONTH,
    }))
}

pub fn get_user_activity(arguments: &Arguments) -> Result<Value, FunctionError> {
    let days = count_arg(arguments, "days", 1, 90)?;

    // One day's actives plus 12% of the remaining base per extra day, capped
    // at the total.
    let extra_days = u64::from(days - 1);
    let window_active =
        (DAILY_ACTIVE + (TOTAL_USERS - DAILY_ACTIVE) * extra_days * 12 / 100).min(TOTAL_USERS);
    let engagement = DAILY_ACTIVE as f64 / window_active as f64 * 100.0;

    Ok(Value::String(format!(
        "User activity (last {days} day{}):\n\
         Daily active users: {}\n\
         Active users in window: {}\n\
         Average session: {AVERAGE_SESSION_MINUTES} minutes\n\
         Engagement rate: {engagement:.1}%",
        if days == 1 { "" } else { "s" },
        format_count(DAILY_ACTIVE),
        format_count(window_active),
    )))
}

pub fn get_user_demographics(arguments: &Arguments) -> Result<Value, FunctionError> {
    let (population, label) = if bool_arg(arguments, "include_inactive")? {
        (TOTAL_USERS, "all users")
    } else {
        (ACTIVE_USERS, "active users")
    };

    let mut lines = vec![format!("User demographics ({} {label}):", format_count(population))];
    lines.push("Regions:".to_string());
    lines.extend(REGION_SHARES.iter().map(|(name, share)| share_line(name, *share, population)));
    lines.push("Age groups:".to_string());
    lines.extend(AGE_SHARES.iter().map(|(name, share)| share_line(name, *share, population)));
    Ok(Value::String(lines.join("\n")))
}

fn share_line(name: &str, share: u64, population: u64) -> String {
    format!("- {name}: {share}% (~{})", format_count(population * share / 100))
}
