use std::sync::OnceLock;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use mailfn_core::{Arguments, FunctionError, FunctionMetadata};
use serde_json::{json, Value};

use crate::BuiltinFunction;

const MODULE: &str = "system";

static STARTED_AT: OnceLock<Instant> = OnceLock::new();

fn started_at() -> Instant {
    *STARTED_AT.get_or_init(Instant::now)
}

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    started_at();
    vec![BuiltinFunction::new(
        "get_system_status",
        get_system_status,
        FunctionMetadata::new(MODULE, "Service status, version and uptime"),
    )]
}

pub fn get_system_status(_: &Arguments) -> Result<Value, FunctionError> {
    Ok(json!({
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": started_at().elapsed().as_secs(),
        "checked_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    }))
}
