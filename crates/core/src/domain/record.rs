use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::function::Arguments;
use crate::domain::resolution::ResolutionFailureReason;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success,
    FunctionError,
    Timeout,
    ResolutionFailed,
    ValidationError,
}

impl ExecutionOutcome {
    pub const ALL: [Self; 5] = [
        Self::Success,
        Self::FunctionError,
        Self::Timeout,
        Self::ResolutionFailed,
        Self::ValidationError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::FunctionError => "function_error",
            Self::Timeout => "timeout",
            Self::ResolutionFailed => "resolution_failed",
            Self::ValidationError => "validation_error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => Some(Self::Success),
            "function_error" => Some(Self::FunctionError),
            "timeout" => Some(Self::Timeout),
            "resolution_failed" => Some(Self::ResolutionFailed),
            "validation_error" => Some(Self::ValidationError),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry per inbound request, whatever happened to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Assigned by the log on append; zero until then.
    pub id: u64,
    pub recorded_at: DateTime<Utc>,
    pub correlation_id: String,
    /// Request text, cut to the configured request bound.
    pub request_text: String,
    /// Sender address for mailed questions, `api` or `cli` otherwise.
    #[serde(default)]
    pub requester: Option<String>,
    pub function_name: Option<String>,
    pub arguments: Arguments,
    pub outcome: ExecutionOutcome,
    pub resolution_failure: Option<ResolutionFailureReason>,
    /// Truncated result on success, truncated error text otherwise. Always
    /// empty for timeouts.
    pub detail: Option<String>,
    pub duration_ms: u64,
}

impl ExecutionRecord {
    pub fn new(
        correlation_id: impl Into<String>,
        request_text: impl Into<String>,
        outcome: ExecutionOutcome,
    ) -> Self {
        Self {
            id: 0,
            recorded_at: Utc::now(),
            correlation_id: correlation_id.into(),
            request_text: request_text.into(),
            requester: None,
            function_name: None,
            arguments: Arguments::new(),
            outcome,
            resolution_failure: None,
            detail: None,
            duration_ms: 0,
        }
    }

    pub fn with_requester(mut self, requester: Option<String>) -> Self {
        self.requester = requester;
        self
    }

    pub fn with_function(mut self, function_name: Option<String>) -> Self {
        self.function_name = function_name;
        self
    }

    pub fn with_arguments(mut self, arguments: Arguments) -> Self {
        self.arguments = arguments;
        self
    }

    /// Raw resolver arguments for records that never reached validation.
    pub fn with_raw_arguments(mut self, arguments: &serde_json::Map<String, Value>) -> Self {
        self.arguments = arguments.iter().map(|(key, value)| (key.clone(), value.clone())).collect();
        self
    }

    pub fn with_resolution_failure(mut self, reason: Option<ResolutionFailureReason>) -> Self {
        self.resolution_failure = reason;
        self
    }

    pub fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// What the caller of the engine gets back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub ok: bool,
    pub outcome: ExecutionOutcome,
    pub display_text: String,
    pub function_name: Option<String>,
    pub record_id: u64,
}
